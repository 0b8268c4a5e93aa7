use actix_web::{get, web, HttpResponse};

use super::{or_empty, FeedQuery, ItemsResponse};
use crate::cache::GLOBAL_KEY;
use crate::feeds::fetch_news;
use crate::normalize::dedup_and_limit;
use crate::AppState;

const NEWS_CAP: usize = 24;

/// Federation news from the news-search RSS, or the federation's own feed when
/// the search comes back empty.
#[get("/api/bwf-news")]
pub async fn bwf_news(state: web::Data<AppState>, query: web::Query<FeedQuery>) -> HttpResponse {
    let limit = query.limit_or(NEWS_CAP).min(NEWS_CAP);
    let cache = &state.caches.news;

    if !query.refresh() {
        if let Some(items) = cache.get_fresh(GLOBAL_KEY).await {
            return HttpResponse::Ok().json(ItemsResponse::cached(dedup_and_limit(items, limit)));
        }
    }

    let mut items = or_empty("bwf-news primary", fetch_news(&state.fetcher, &state.config.news_url).await);
    if items.is_empty() {
        items = or_empty(
            "bwf-news fallback",
            fetch_news(&state.fetcher, &state.config.news_fallback_url).await,
        );
    }

    let items = dedup_and_limit(items, NEWS_CAP);
    if !items.is_empty() {
        cache.put(GLOBAL_KEY, items.clone()).await;
    }
    HttpResponse::Ok().json(ItemsResponse::fresh(dedup_and_limit(items, limit)))
}
