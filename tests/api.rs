use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use clap::Parser;
use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use altius_feeds::api::{ImageResponse, ItemsResponse};
use altius_feeds::{configure, AppState, Args};

const PAGE_ID: &str = "42";

/// Every upstream pointed at the mock server, no credentials.
fn args(server: &MockServer) -> Args {
    let base = server.base_url();
    let mut args = Args::parse_from([
        "altius-feeds".to_string(),
        format!("--graph-api-base={base}/graph"),
        format!("--mobile-base={base}/m"),
        format!("--basic-base={base}/mbasic"),
        format!("--read-proxy-base={base}/reader"),
        format!("--scraperapi-base={base}/scraperapi"),
        format!("--scrapingbee-base={base}/scrapingbee/"),
        format!("--image-cdn-base={base}/cdn/"),
        format!("--rss-app-feed-url={base}/feed.json"),
        format!("--news-url={base}/news.xml"),
        format!("--news-fallback-url={base}/bwf.xml"),
        format!("--fallback-page-id={PAGE_ID}"),
        "--image-proxy-hosts=127.0.0.1".to_string(),
    ]);
    args.fb_page_id = None;
    args.fb_access_token = None;
    args.scraperapi_key = None;
    args.scrapingbee_key = None;
    args
}

fn with_graph(mut args: Args) -> Args {
    args.fb_page_id = Some(PAGE_ID.to_string());
    args.fb_access_token = Some("token".to_string());
    args
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

macro_rules! app {
    ($args:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new($args).unwrap()))
                .configure(configure),
        )
        .await
    };
}

macro_rules! get_json {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get().uri(&$uri).to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        body
    }};
}

fn graph_body() -> Value {
    json!({
        "data": [
            {
                "id": "42_1",
                "message": "Spring tournament registration is open. Sign up at the desk!",
                "created_time": "2024-03-02T10:00:00+0000",
                "permalink_url": "https://www.facebook.com/42/posts/1",
                "full_picture": "https://scontent.fbcdn.net/1.jpg"
            },
            {
                "id": "42_1_dup",
                "message": "Same permalink twice",
                "created_time": "2024-03-02T10:00:00+0000",
                "permalink_url": "https://www.facebook.com/42/posts/1"
            },
            {
                "id": "42_2",
                "story": "Altius updated their cover photo.",
                "created_time": "2024-03-01T10:00:00+0000",
                "permalink_url": "https://www.facebook.com/42/posts/2"
            },
            "not an object"
        ]
    })
}

fn json_feed_body() -> Value {
    json!({
        "version": "https://jsonfeed.org/version/1.1",
        "items": [
            {
                "id": "a",
                "url": "https://www.facebook.com/42/posts/10",
                "title": "League match schedule published",
                "content_text": "All match times for the autumn league.",
                "image": "https://scontent.fbcdn.net/10.jpg",
                "date_published": "2024-05-01T09:00:00.000Z"
            },
            {
                "id": "b",
                "url": "https://www.facebook.com/42/posts/11",
                "title": "Photos from practice",
                "content_text": "Great session yesterday.",
                "date_published": "2024-05-03T09:00:00.000Z"
            }
        ]
    })
}

#[actix_web::test]
async fn graph_posts_degrade_without_credentials() {
    let server = MockServer::start_async().await;
    let app = app!(args(&server));

    let body = get_json!(app, "/api/fb-posts");
    assert_eq!(body, json!({ "items": [] }));
}

#[actix_web::test]
async fn graph_posts_are_cached_until_refresh() {
    let server = MockServer::start_async().await;
    let graph = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/graph/42/posts")
                .query_param("access_token", "token");
            then.status(200).json_body(graph_body());
        })
        .await;
    let app = app!(with_graph(args(&server)));

    let first: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-posts?limit=5")).unwrap();
    assert_eq!(first.cached, Some(false));
    let urls: Vec<_> = first.items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://www.facebook.com/42/posts/1", "https://www.facebook.com/42/posts/2"]
    );
    assert_eq!(first.items[0].title, "Spring tournament registration is open");
    assert_eq!(first.items[0].date, "2024-03-02T10:00:00.000Z");

    let second: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-posts?limit=5")).unwrap();
    assert_eq!(second.cached, Some(true));
    assert_eq!(second.items, first.items);
    graph.assert_hits_async(1).await;

    let limited: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-posts?limit=1")).unwrap();
    assert_eq!(limited.items.len(), 1);

    let refreshed: ItemsResponse =
        serde_json::from_value(get_json!(app, "/api/fb-posts?limit=5&refresh=1")).unwrap();
    assert_eq!(refreshed.cached, Some(false));
    graph.assert_hits_async(2).await;
}

#[actix_web::test]
async fn graph_failure_is_absorbed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/graph/42/posts");
            then.status(500).body("boom");
        })
        .await;
    let app = app!(with_graph(args(&server)));

    let body = get_json!(app, "/api/fb-posts");
    assert_eq!(body, json!({ "items": [] }));
}

#[actix_web::test]
async fn og_resolves_relative_image_and_caches_per_url() {
    let server = MockServer::start_async().await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("content-type", "text/html")
                .body(r#"<html><head><meta property="og:image" content="/img/a.png"></head></html>"#);
        })
        .await;
    let app = app!(args(&server));

    let target = server.url("/page");
    let uri = format!("/api/og?url={}", encode(&target));

    let first: ImageResponse = serde_json::from_value(get_json!(app, uri)).unwrap();
    assert_eq!(first.url, target);
    assert_eq!(first.image, Some(server.url("/img/a.png")));
    assert_eq!(first.cached, Some(false));

    let second: ImageResponse = serde_json::from_value(get_json!(app, uri)).unwrap();
    assert_eq!(second.cached, Some(true));
    assert_eq!(second.image, first.image);
    page.assert_hits_async(1).await;
}

#[actix_web::test]
async fn image_endpoints_require_url() {
    let server = MockServer::start_async().await;
    let app = app!(args(&server));

    for uri in ["/api/og", "/api/fb-og", "/api/fb-preview", "/api/image-proxy", "/api/image-resize"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[actix_web::test]
async fn image_proxy_serves_bytes_with_cors_headers() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/photo.png");
            then.status(200)
                .header("content-type", "image/png")
                .body(b"\x89PNG fake".to_vec());
        })
        .await;
    let app = app!(args(&server));

    let uri = format!("/api/image-proxy?url={}", encode(&server.url("/photo.png")));
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=3600, s-maxage=3600"
    );
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"\x89PNG fake");
}

#[actix_web::test]
async fn image_proxy_404_when_every_strategy_fails() {
    let server = MockServer::start_async().await;
    let upstream = server
        .mock_async(|when, then| {
            when.method(GET);
            then.status(503);
        })
        .await;
    let app = app!(args(&server));

    let uri = format!("/api/image-proxy?url={}", encode(&server.url("/gone.jpg")));
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    // crawler, browser, image CDN
    upstream.assert_hits_async(3).await;
}

#[actix_web::test]
async fn image_proxy_rejects_foreign_hosts() {
    let server = MockServer::start_async().await;
    let app = app!(args(&server));

    let uri = format!("/api/image-proxy?url={}", encode("https://example.com/a.jpg"));
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn image_resize_passthrough() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/big.jpg");
            then.status(200).header("content-type", "image/jpeg").body("jpeg");
        })
        .await;
    let app = app!(args(&server));

    let uri = format!("/api/image-resize?url={}&width=200&quality=50", encode(&server.url("/big.jpg")));
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=31536000, immutable"
    );

    let uri = format!("/api/image-resize?url={}", encode(&server.url("/missing.jpg")));
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[actix_web::test]
async fn oembed_image_lookup() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/graph/oembed_video");
            then.status(200).json_body(json!({ "thumbnail_url": "https://scontent.fbcdn.net/thumb.jpg" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/graph/oembed_post");
            then.status(403);
        })
        .await;

    let post = "https://www.facebook.com/42/posts/1";
    let video = "https://www.facebook.com/42/videos/7";

    let app = app!(args(&server));
    let body = get_json!(app, format!("/api/fb-og?url={}", encode(post)));
    assert_eq!(body, json!({ "url": post, "image": null, "reason": "no_token" }));

    let app = app!(with_graph(args(&server)));
    let body = get_json!(app, format!("/api/fb-og?url={}", encode(video)));
    assert_eq!(body, json!({ "url": video, "image": "https://scontent.fbcdn.net/thumb.jpg" }));

    let body = get_json!(app, format!("/api/fb-og?url={}", encode(post)));
    assert_eq!(body, json!({ "url": post, "image": null, "reason": "status_403" }));
}

#[actix_web::test]
async fn preview_falls_back_to_mobile_page() {
    let server = MockServer::start_async().await;
    // desktop page through the read proxy: no preview metadata
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reader/http://www.facebook.com/42/posts/1");
            then.status(200).body("<html><body><img src='/ignored.jpg'></body></html>");
        })
        .await;
    let mobile_path = format!("/reader/http://127.0.0.1:{}/m/42/posts/1", server.port());
    server
        .mock_async(|when, then| {
            when.method(GET).path(mobile_path.as_str());
            then.status(200).body("<html><body><img src='/photos/p.jpg'></body></html>");
        })
        .await;
    let app = app!(args(&server));

    let post = "https://www.facebook.com/42/posts/1";
    let body = get_json!(app, format!("/api/fb-preview?url={}", encode(post)));
    assert_eq!(
        body,
        json!({ "url": post, "image": server.url("/photos/p.jpg"), "source": "mobile" })
    );
}

const TIMELINE: &str = r#"
<html><body>
  <article>
    <p>Club championship results are in. Congratulations to all players!</p>
    <img src="/photos/cup-720x480.jpg">
    <abbr>March 3, 2024</abbr>
    <a href="/story.php?story_fbid=1&amp;id=42">Full story</a>
  </article>
  <article>
    <p>Training resumes on Monday</p>
    <a href="/42/posts/2">Post</a>
  </article>
</body></html>"#;

fn reader_path(server: &MockServer, path: &str) -> String {
    format!("/reader/http://127.0.0.1:{}{path}", server.port())
}

#[actix_web::test]
async fn tokenless_scrape_goes_through_the_read_proxy() {
    let server = MockServer::start_async().await;
    let login_wall = server
        .mock_async(|when, then| {
            when.method(GET).path("/m/profile.php");
            then.status(200)
                .header("content-type", "text/html")
                .body(r#"<html><body><form action="/login/"><input name="email"></form></body></html>"#);
        })
        .await;
    let timeline_path = reader_path(&server, "/m/profile.php");
    let timeline = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(timeline_path.as_str())
                .query_param("id", PAGE_ID)
                .query_param("v", "timeline");
            then.status(200).header("content-type", "text/html").body(TIMELINE);
        })
        .await;
    let app = app!(args(&server));

    let body: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-scrape?limit=5")).unwrap();
    assert_eq!(body.cached, Some(false));
    assert_eq!(body.items.len(), 2);

    let first = &body.items[0];
    assert_eq!(first.url, server.url("/story.php?story_fbid=1&id=42"));
    assert_eq!(first.id, first.url);
    assert_eq!(first.title, "Club championship results are in");
    assert_eq!(first.image, server.url("/photos/cup.jpg"));
    assert_eq!(first.date, "2024-03-03T00:00:00.000Z");
    assert_eq!(body.items[1].title, "Training resumes on Monday Post");

    let again: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-scrape?limit=1")).unwrap();
    assert_eq!(again.cached, Some(true));
    assert_eq!(again.items.len(), 1);
    timeline.assert_hits_async(1).await;
    login_wall.assert_hits_async(0).await;
}

#[actix_web::test]
async fn club_feed_has_no_excerpts() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/feed.json");
            then.status(200).json_body(json_feed_body());
        })
        .await;
    let app = app!(args(&server));

    let body: ItemsResponse = serde_json::from_value(get_json!(app, "/api/rss-club?limit=1")).unwrap();
    assert_eq!(body.cached, Some(false));
    assert_eq!(body.items.len(), 1);
    assert_eq!(body.items[0].title, "League match schedule published");
    assert_eq!(body.items[0].excerpt, "");
}

#[actix_web::test]
async fn zero_limit_returns_no_items() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/feed.json");
            then.status(200).json_body(json_feed_body());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/graph/42/posts");
            then.status(200).json_body(graph_body());
        })
        .await;
    let app = app!(with_graph(args(&server)));

    for endpoint in ["/api/rss-club", "/api/fb-rss", "/api/fb-feed", "/api/fb-posts", "/api/fb-scrape"] {
        for limit in ["0", "-3"] {
            let body: ItemsResponse =
                serde_json::from_value(get_json!(app, format!("{endpoint}?limit={limit}"))).unwrap();
            assert!(body.items.is_empty(), "{endpoint}?limit={limit}");
        }
    }

    let club: ItemsResponse = serde_json::from_value(get_json!(app, "/api/rss-club?limit=2")).unwrap();
    assert_eq!(club.items.len(), 2);
}

#[actix_web::test]
async fn json_feed_ingestion_with_scrape_top_up() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/feed.json");
            then.status(200).json_body(json_feed_body());
        })
        .await;
    let timeline_path = reader_path(&server, "/m/profile.php");
    server
        .mock_async(|when, then| {
            when.method(GET).path(timeline_path.as_str());
            then.status(200).body(TIMELINE);
        })
        .await;
    let app = app!(args(&server));

    let body: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-rss?limit=3")).unwrap();
    assert_eq!(body.cached, Some(false));
    let urls: Vec<_> = body.items.iter().map(|i| i.url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            "https://www.facebook.com/42/posts/10".to_string(),
            "https://www.facebook.com/42/posts/11".to_string(),
            server.url("/story.php?story_fbid=1&id=42"),
        ]
    );
    assert_eq!(body.items[0].excerpt, "All match times for the autumn league.");
}

#[actix_web::test]
async fn json_feed_ingestion_degrades_to_empty() {
    let server = MockServer::start_async().await;
    let app = app!(args(&server));

    // nothing mocked: feed, scrape and fallback all 404
    let body = get_json!(app, "/api/fb-rss?limit=3");
    assert_eq!(body, json!({ "items": [] }));
}

#[actix_web::test]
async fn aggregated_feed_sorts_and_filters_events() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/feed.json");
            then.status(200).json_body(json_feed_body());
        })
        .await;
    let app = app!(args(&server));

    let body: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-feed")).unwrap();
    let urls: Vec<_> = body.items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(
        urls,
        vec!["https://www.facebook.com/42/posts/11", "https://www.facebook.com/42/posts/10"]
    );

    let events: ItemsResponse = serde_json::from_value(get_json!(app, "/api/fb-feed?type=events")).unwrap();
    assert_eq!(events.cached, Some(true));
    let urls: Vec<_> = events.items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["https://www.facebook.com/42/posts/10"]);
}

#[actix_web::test]
async fn news_falls_back_to_federation_feed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/news.xml");
            then.status(200)
                .body(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>empty</title></channel></rss>"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/bwf.xml");
            then.status(200).body(
                r#"<?xml version="1.0"?><rss version="2.0"><channel><title>BWF</title>
                <item><title>Finals draw</title><link>https://bwfbadminton.com/news/1</link>
                <pubDate>Sun, 01 Dec 2024 09:00:00 GMT</pubDate></item>
                </channel></rss>"#,
            );
        })
        .await;
    let app = app!(args(&server));

    let body: ItemsResponse = serde_json::from_value(get_json!(app, "/api/bwf-news")).unwrap();
    assert_eq!(body.items.len(), 1);
    assert_eq!(body.items[0].url, "https://bwfbadminton.com/news/1");
    assert_eq!(body.items[0].date, "2024-12-01T09:00:00.000Z");
}

#[actix_web::test]
async fn debug_env_reports_presence_only() {
    let server = MockServer::start_async().await;
    let mut config = args(&server);
    config.scraperapi_key = Some("secret".to_string());
    config.fb_page_id = Some("61562124174747".to_string());
    let app = app!(config);

    let body = get_json!(app, "/api/debug-env");
    assert_eq!(body, json!({ "hasScraper": true, "hasBee": false, "pageIdLength": 14 }));
}
