//! HTTP endpoints. Every scraping endpoint answers 200 with an empty or null
//! payload when anything goes wrong; only the binary image endpoints use
//! error statuses.

use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Error;
use crate::normalize::FeedItem;

pub mod debug;
pub mod images;
pub mod news;
pub mod posts;

pub const MAX_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<String>,
    pub refresh: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl FeedQuery {
    /// Requested limit, clamped to `0..=MAX_LIMIT`; unparseable values use `default`.
    /// Zero is honoured and yields an empty list.
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<f64>().ok())
            .filter(|l| l.is_finite())
            .map(|l| l.max(0.0) as usize)
            .unwrap_or(default)
            .min(MAX_LIMIT)
    }

    pub fn refresh(&self) -> bool {
        is_truthy(self.refresh.as_deref())
    }

    pub fn wants_events(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case("events"))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
    pub refresh: Option<String>,
}

impl UrlQuery {
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn refresh(&self) -> bool {
        is_truthy(self.refresh.as_deref())
    }
}

/// `refresh=1`, `refresh=true`, bare `refresh=`... anything but `0`/`false`.
fn is_truthy(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None => false,
        Some(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    pub items: Vec<FeedItem>,
}

impl ItemsResponse {
    pub fn fresh(items: Vec<FeedItem>) -> Self {
        Self {
            cached: Some(false),
            items,
        }
    }

    pub fn cached(items: Vec<FeedItem>) -> Self {
        Self {
            cached: Some(true),
            items,
        }
    }

    pub fn empty() -> Self {
        Self {
            cached: None,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub url: String,
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ImageResponse {
    pub fn found(url: &str, image: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            image,
            cached: None,
            source: None,
            reason: None,
        }
    }

    pub fn missing(url: &str) -> Self {
        Self::found(url, None)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_json(status: actix_web::http::StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(ErrorBody {
        error: message.to_string(),
    })
}

pub fn url_required() -> HttpResponse {
    error_json(actix_web::http::StatusCode::BAD_REQUEST, "url is required")
}

/// Endpoint boundary: logs the failure and answers with an empty item list.
pub fn absorb_items(endpoint: &str, err: Error) -> HttpResponse {
    log_absorbed(endpoint, &err);
    HttpResponse::Ok().json(ItemsResponse::empty())
}

/// Failure of one step inside a pipeline that can continue without it.
pub fn or_empty<T>(step: &str, result: crate::error::Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        log_absorbed(step, &e);
        Vec::new()
    })
}

fn log_absorbed(what: &str, err: &Error) {
    match err {
        Error::NotConfigured(missing) => info!(what, missing, "skipped, not configured"),
        _ => warn!(what, error = %err, "upstream failure absorbed"),
    }
}
