use actix_web::{get, web, HttpResponse};
use tracing::debug;

use super::{absorb_items, or_empty, FeedQuery, ItemsResponse};
use crate::cache::GLOBAL_KEY;
use crate::error::{Error, Result};
use crate::facebook::{fetch_graph_posts, scrape_timeline};
use crate::feeds::fetch_json_feed;
use crate::normalize::{dedup_and_limit, merge_unique, sort_newest_first, FeedItem};
use crate::AppState;

/// Most items the aggregated feed keeps between refreshes.
const SOCIAL_FEED_CAP: usize = 100;

/// Page posts from the Graph API; needs both page id and access token.
#[get("/api/fb-posts")]
pub async fn fb_posts(state: web::Data<AppState>, query: web::Query<FeedQuery>) -> HttpResponse {
    match graph_posts(&state, &query).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => absorb_items("fb-posts", e),
    }
}

async fn graph_posts(state: &AppState, query: &FeedQuery) -> Result<ItemsResponse> {
    let limit = query.limit_or(10);
    let (Some(page_id), Some(token)) = (state.config.page_id(), state.config.access_token()) else {
        return Err(Error::NotConfigured("FB_PAGE_ID / FB_ACCESS_TOKEN"));
    };

    let cache = &state.caches.graph_posts;
    if !query.refresh() {
        if let Some(items) = cache.get_fresh(GLOBAL_KEY).await {
            debug!("fb-posts cache hit");
            return Ok(ItemsResponse::cached(dedup_and_limit(items, limit)));
        }
    }

    let posts = fetch_graph_posts(&state.fetcher, &state.config.graph_api_base, page_id, token, limit).await?;
    let posts = dedup_and_limit(posts, usize::MAX);
    cache.put(GLOBAL_KEY, posts.clone()).await;
    Ok(ItemsResponse::fresh(dedup_and_limit(posts, limit)))
}

/// Tokenless scrape of the page's mobile timeline.
#[get("/api/fb-scrape")]
pub async fn fb_scrape(state: web::Data<AppState>, query: web::Query<FeedQuery>) -> HttpResponse {
    match scraped_posts(&state, &query).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => absorb_items("fb-scrape", e),
    }
}

async fn scraped_posts(state: &AppState, query: &FeedQuery) -> Result<ItemsResponse> {
    let limit = query.limit_or(10);
    let cache = &state.caches.scraped_posts;
    if !query.refresh() {
        if let Some(items) = cache.get_fresh(GLOBAL_KEY).await.filter(|i| !i.is_empty()) {
            return Ok(ItemsResponse::cached(dedup_and_limit(items, limit)));
        }
    }

    let posts = scrape_timeline(&state.fetcher, state.config.scrape_page_id(), limit).await?;
    if !posts.is_empty() {
        cache.put(GLOBAL_KEY, posts.clone()).await;
    }
    Ok(ItemsResponse::fresh(dedup_and_limit(posts, limit)))
}

/// External JSON feed, topped up with scraped posts, falling back to the
/// plain club feed when both come back empty.
#[get("/api/fb-rss")]
pub async fn fb_rss(state: web::Data<AppState>, query: web::Query<FeedQuery>) -> HttpResponse {
    match rss_posts(&state, &query).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => absorb_items("fb-rss", e),
    }
}

async fn rss_posts(state: &AppState, query: &FeedQuery) -> Result<ItemsResponse> {
    let limit = query.limit_or(10);
    let cache = &state.caches.rss_posts;
    if !query.refresh() {
        if let Some(items) = cache.get_fresh(GLOBAL_KEY).await.filter(|i| !i.is_empty()) {
            return Ok(ItemsResponse::cached(dedup_and_limit(items, limit)));
        }
    }

    let entries = or_empty("fb-rss json feed", fetch_json_feed(&state.fetcher, &state.config.rss_app_feed_url).await);
    let mut items = dedup_and_limit(
        entries.iter().map(FeedItem::from_json_entry).collect(),
        limit,
    );

    if items.len() < limit {
        let scraped = or_empty(
            "fb-rss scrape",
            scrape_timeline(&state.fetcher, state.config.scrape_page_id(), limit * 2).await,
        );
        merge_unique(&mut items, scraped, limit);
    }

    if !items.is_empty() {
        cache.put(GLOBAL_KEY, items.clone()).await;
        return Ok(ItemsResponse::fresh(items));
    }

    let (_, fallback) = club_feed(state, limit, true).await?;
    if fallback.is_empty() {
        Ok(ItemsResponse::empty())
    } else {
        Ok(ItemsResponse::fresh(fallback))
    }
}

/// The external JSON feed on its own.
#[get("/api/rss-club")]
pub async fn rss_club(state: web::Data<AppState>, query: web::Query<FeedQuery>) -> HttpResponse {
    match club_feed(&state, query.limit_or(10), query.refresh()).await {
        Ok((true, items)) => HttpResponse::Ok().json(ItemsResponse::cached(items)),
        Ok((false, items)) => HttpResponse::Ok().json(ItemsResponse::fresh(items)),
        Err(e) => absorb_items("rss-club", e),
    }
}

/// Returns whether the items came from the cache, and the items.
pub async fn club_feed(state: &AppState, limit: usize, refresh: bool) -> Result<(bool, Vec<FeedItem>)> {
    let cache = &state.caches.club_feed;
    if !refresh {
        if let Some(items) = cache.get_fresh(GLOBAL_KEY).await {
            return Ok((true, dedup_and_limit(items, limit)));
        }
    }

    let entries = fetch_json_feed(&state.fetcher, &state.config.rss_app_feed_url).await?;
    let items: Vec<FeedItem> = entries
        .iter()
        .map(|entry| FeedItem {
            excerpt: String::new(),
            ..FeedItem::from_json_entry(entry)
        })
        .collect();
    let items = dedup_and_limit(items, usize::MAX);
    cache.put(GLOBAL_KEY, items.clone()).await;
    Ok((false, dedup_and_limit(items, limit)))
}

/// Everything combined: Graph posts, then the JSON feed, then the scrape, newest first.
/// `type=events` narrows the result to tournament/registration-style posts.
#[get("/api/fb-feed")]
pub async fn fb_feed(state: web::Data<AppState>, query: web::Query<FeedQuery>) -> HttpResponse {
    match social_feed(&state, &query).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => absorb_items("fb-feed", e),
    }
}

async fn social_feed(state: &AppState, query: &FeedQuery) -> Result<ItemsResponse> {
    let limit = query.limit_or(12);
    let events = query.wants_events();
    let cache = &state.caches.social_feed;

    if !query.refresh() {
        if let Some(items) = cache.get_fresh(GLOBAL_KEY).await {
            return Ok(ItemsResponse::cached(select(items, events, limit)));
        }
    }

    let page_id = state.config.scrape_page_id();
    let mut items = match state.config.access_token() {
        Some(token) => or_empty(
            "fb-feed graph",
            fetch_graph_posts(&state.fetcher, &state.config.graph_api_base, page_id, token, limit * 2).await,
        ),
        None => Vec::new(),
    };
    items = dedup_and_limit(items, usize::MAX);

    if items.len() < limit {
        let entries = or_empty("fb-feed json feed", fetch_json_feed(&state.fetcher, &state.config.rss_app_feed_url).await);
        let feed = entries.iter().take(limit * 2).map(FeedItem::from_json_entry).collect();
        merge_unique(&mut items, feed, usize::MAX);

        if items.len() < limit {
            let scraped = or_empty("fb-feed scrape", scrape_timeline(&state.fetcher, page_id, limit * 2).await);
            merge_unique(&mut items, scraped, usize::MAX);
        }
    }

    items.retain(|item| !item.url.is_empty());
    sort_newest_first(&mut items);
    items.truncate(SOCIAL_FEED_CAP);
    cache.put(GLOBAL_KEY, items.clone()).await;

    Ok(ItemsResponse::fresh(select(items, events, limit)))
}

fn select(mut items: Vec<FeedItem>, events: bool, limit: usize) -> Vec<FeedItem> {
    if events {
        items.retain(FeedItem::is_event_like);
    }
    sort_newest_first(&mut items);
    dedup_and_limit(items, limit)
}
