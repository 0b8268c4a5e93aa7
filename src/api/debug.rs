use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::AppState;

/// Which credentials the running instance sees, without revealing them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvReport {
    pub has_scraper: bool,
    pub has_bee: bool,
    pub page_id_length: usize,
}

#[get("/api/debug-env")]
pub async fn debug_env(state: web::Data<AppState>) -> HttpResponse {
    let upstreams = state.fetcher.upstreams();
    HttpResponse::Ok().json(EnvReport {
        has_scraper: upstreams.scraperapi_key.is_some(),
        has_bee: upstreams.scrapingbee_key.is_some(),
        page_id_length: state.config.page_id().map(|id| id.chars().count()).unwrap_or(0),
    })
}
