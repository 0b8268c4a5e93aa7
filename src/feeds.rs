use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::normalize::{FeedItem, JsonFeedEntry};

/// Entries of an external JSON feed. Entries that don't fit the expected shape
/// are skipped rather than failing the whole feed.
pub async fn fetch_json_feed(fetcher: &Fetcher, feed_url: &str) -> Result<Vec<JsonFeedEntry>> {
    let json: Value = fetcher.get_json(feed_url).await?;
    Ok(parse_json_feed(&json))
}

pub fn parse_json_feed(json: &Value) -> Vec<JsonFeedEntry> {
    json.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Items of an RSS or Atom feed.
pub async fn fetch_news(fetcher: &Fetcher, feed_url: &str) -> Result<Vec<FeedItem>> {
    let content = fetcher.get_raw(feed_url).await?;
    let items = parse_news(&content.body)?;
    info!(url = feed_url, count = items.len(), "fetched news feed");
    Ok(items)
}

pub fn parse_news(body: &[u8]) -> Result<Vec<FeedItem>> {
    let feed = feed_rs::parser::parse(body).map_err(|e| Error::FeedParse(e.to_string()))?;
    Ok(feed
        .entries
        .iter()
        .filter_map(FeedItem::from_feed_entry)
        .collect())
}
