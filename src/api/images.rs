use actix_web::http::{header, StatusCode};
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{error_json, url_required, ImageResponse, UrlQuery};
use crate::facebook::fetch_oembed_image;
use crate::fetch::{Plan, RawContent, Upstreams};
use crate::html::Page;
use crate::AppState;

const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Thumbnail of a social permalink via the oEmbed API.
#[get("/api/fb-og")]
pub async fn fb_og(state: web::Data<AppState>, query: web::Query<UrlQuery>) -> HttpResponse {
    let Some(url) = query.url() else {
        return url_required();
    };
    let Some(token) = state.config.access_token() else {
        return HttpResponse::Ok().json(ImageResponse {
            reason: Some("no_token".to_string()),
            ..ImageResponse::missing(url)
        });
    };

    match fetch_oembed_image(&state.fetcher, &state.config.graph_api_base, token, url).await {
        Ok(image) => HttpResponse::Ok().json(ImageResponse::found(url, image)),
        Err(e) => {
            warn!(url, error = %e, "oembed lookup failed");
            HttpResponse::Ok().json(ImageResponse {
                reason: Some(e.reason()),
                ..ImageResponse::missing(url)
            })
        }
    }
}

/// Preview image of a social permalink scraped through the proxy chain, then
/// through the mobile and basic variants of the page.
#[get("/api/fb-preview")]
pub async fn fb_preview(state: web::Data<AppState>, query: web::Query<UrlQuery>) -> HttpResponse {
    let Some(url) = query.url() else {
        return url_required();
    };
    let upstreams = state.fetcher.upstreams();
    let plan = Plan::proxied(upstreams);

    let mut candidates = vec![(url.to_string(), "og")];
    candidates.extend(upstreams.mobile_variant(url).map(|u| (u, "mobile")));
    candidates.extend(upstreams.basic_variant(url).map(|u| (u, "mobile")));

    for (candidate, source) in candidates {
        let content = match state.fetcher.fetch(&candidate, &plan).await {
            Ok(content) => content,
            Err(e) => {
                debug!(url = %candidate, error = %e, "preview candidate failed");
                continue;
            }
        };
        let image = {
            let page = Page::parse(&content.text(), &candidate);
            let image = if source == "og" {
                page.meta_image()
            } else {
                page.preview_image()
            };
            image.and_then(|img| page.resolve(&img))
        };
        if let Some(image) = image {
            return HttpResponse::Ok().json(ImageResponse {
                source: Some(source.to_string()),
                ..ImageResponse::found(url, Some(image))
            });
        }
    }

    HttpResponse::Ok().json(ImageResponse::missing(url))
}

/// Open Graph image of an arbitrary page, cached per URL.
#[get("/api/og")]
pub async fn og(state: web::Data<AppState>, query: web::Query<UrlQuery>) -> HttpResponse {
    let Some(url) = query.url() else {
        return url_required();
    };

    let cache = &state.caches.og_images;
    if !query.refresh() {
        if let Some(image) = cache.get_fresh(url).await {
            return HttpResponse::Ok().json(ImageResponse {
                cached: Some(true),
                ..ImageResponse::found(url, image)
            });
        }
    }

    let upstreams = state.fetcher.upstreams();
    let image = match state.fetcher.fetch(url, &Plan::page(upstreams)).await {
        Ok(content) => page_preview(&content, url, upstreams),
        Err(e) => {
            warn!(url, error = %e, "og page unreachable");
            None
        }
    };

    cache.put(url, image.clone()).await;
    HttpResponse::Ok().json(ImageResponse {
        cached: Some(false),
        ..ImageResponse::found(url, image)
    })
}

/// Preview image of fetched HTML, resolved against the page the strategy actually
/// fetched (the mobile or basic variant, or `target` itself).
fn page_preview(content: &RawContent, target: &str, upstreams: &Upstreams) -> Option<String> {
    let page = Page::parse(&content.text(), &content.strategy.page_url(target, upstreams));
    page.preview_image().and_then(|img| page.resolve(&img))
}

/// Re-serves a social CDN image so the browser can load it without CORS or
/// hotlink blocking.
#[get("/api/image-proxy")]
pub async fn image_proxy(state: web::Data<AppState>, query: web::Query<UrlQuery>) -> HttpResponse {
    let Some(url) = query.url() else {
        return error_json(StatusCode::BAD_REQUEST, "URL parameter is required");
    };
    if !is_allowed_host(url, &state.config.image_proxy_hosts) {
        return error_json(StatusCode::BAD_REQUEST, "Only Facebook images are allowed");
    }

    match state.fetcher.fetch(url, &Plan::image()).await {
        Ok(content) => {
            debug!(url, strategy = content.strategy.name(), "image proxied");
            image_response(content, "public, max-age=3600, s-maxage=3600")
        }
        Err(e) => {
            warn!(url, error = %e, "all image proxy strategies failed");
            error_json(StatusCode::NOT_FOUND, "Image not accessible")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResizeQuery {
    pub url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub quality: Option<String>,
}

/// Passes the image through untouched; the sizing parameters are accepted for
/// compatibility with existing callers.
#[get("/api/image-resize")]
pub async fn image_resize(state: web::Data<AppState>, query: web::Query<ResizeQuery>) -> HttpResponse {
    let Some(url) = query.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return error_json(StatusCode::BAD_REQUEST, "Image URL is required");
    };
    debug!(
        url,
        width = ?query.width,
        height = ?query.height,
        quality = ?query.quality,
        "image resize passthrough"
    );

    match state.fetcher.get_raw(url).await {
        Ok(content) => image_response(content, "public, max-age=31536000, immutable"),
        Err(e) => {
            warn!(url, error = %e, "image fetch failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process image")
        }
    }
}

fn image_response(content: RawContent, cache_control: &str) -> HttpResponse {
    let content_type = content
        .content_type
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string());

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header((header::CACHE_CONTROL, cache_control.to_string()))
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .body(content.body)
}

/// True when the URL's host is one of `allowed` or a subdomain of one.
fn is_allowed_host(url: &str, allowed: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    allowed.iter().map(|a| a.trim()).any(|allowed| {
        !allowed.is_empty() && (host == allowed || host.ends_with(&format!(".{allowed}")))
    })
}
