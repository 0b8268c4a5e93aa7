use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use crate::custom_date::{format_iso, parse_source_date, to_iso_or_now};
use crate::html::{fragment_image, normalize_text, strip_tags, PostBlock};

pub const TITLE_LIMIT: usize = 180;
pub const EXCERPT_LIMIT: usize = 220;
pub const CATEGORY: &str = "news";
const SCRAPED_TITLE_FALLBACK: &str = "Пост Facebook";

lazy_static! {
    static ref SIZED_IMAGE: Regex = Regex::new(r"(?i)-\d+x\d+\.(jpg|jpeg|png|webp)$").unwrap();
}

const EVENT_KEYWORDS: &[&str] = &[
    "турнир", "турнір", "соревнован", "чемпионат", "чемпіонат", "кубок", "лига", "ліга", "матч",
    "расписан", "регистрац", "запис", "тур", "open", "cup", "championship", "league", "match",
    "schedule", "registration", "event", "tournament", "start at", "starts", "даты", "календарь",
];

/// Canonical item every endpoint returns. All fields are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub image: String,
    pub date: String,
    pub url: String,
    pub category: String,
}

/// Post object as returned by the Graph API `/{page}/posts` edge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphPost {
    pub id: Option<String>,
    pub message: Option<String>,
    pub story: Option<String>,
    pub created_time: Option<String>,
    pub permalink_url: Option<String>,
    pub full_picture: Option<String>,
}

/// Entry of an external JSON feed (JSON Feed 1.1 as served by rss.app).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonFeedEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub content_text: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub image: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub date_published: Option<String>,
}

/// Strings pass through, numbers are stringified, anything else is `None`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl FeedItem {
    pub fn from_graph_post(post: &GraphPost) -> Self {
        let text = first_non_empty(&[&post.message, &post.story]);
        let id = non_empty(&post.id).unwrap_or_default();
        let url = non_empty(&post.permalink_url).unwrap_or_else(|| {
            if id.is_empty() {
                String::new()
            } else {
                format!("https://www.facebook.com/{id}")
            }
        });

        Self {
            id: if id.is_empty() { url.clone() } else { id },
            title: derive_title(&text),
            excerpt: truncate_excerpt(text.trim()),
            image: non_empty(&post.full_picture).unwrap_or_default(),
            date: to_iso_or_now(post.created_time.as_deref().unwrap_or_default()),
            url,
            category: CATEGORY.to_string(),
        }
    }

    /// Block scraped from a mobile timeline; `href` and `image` are already absolute.
    pub fn from_post_block(block: &PostBlock) -> Self {
        let text = normalize_text(&block.text);
        let title = derive_title(&text);

        Self {
            id: block.href.clone(),
            title: if title.is_empty() {
                SCRAPED_TITLE_FALLBACK.to_string()
            } else {
                title
            },
            excerpt: truncate_excerpt(&text),
            image: strip_size_suffix(&block.image),
            date: to_iso_or_now(&block.date),
            url: block.href.clone(),
            category: CATEGORY.to_string(),
        }
    }

    pub fn from_json_entry(entry: &JsonFeedEntry) -> Self {
        let content = entry.content_text.as_deref().unwrap_or_default().trim();
        let title = match non_empty(&entry.title) {
            Some(title) => truncate_chars(title.trim(), TITLE_LIMIT),
            None => derive_title(content),
        };
        let url = non_empty(&entry.url).unwrap_or_else(|| "#".to_string());
        let id = non_empty(&entry.id)
            .or_else(|| non_empty(&entry.url))
            .unwrap_or_else(|| generated_id(&title, entry.date_published.as_deref()));

        Self {
            id,
            title,
            excerpt: truncate_excerpt(content),
            image: non_empty(&entry.image).unwrap_or_default(),
            date: to_iso_or_now(entry.date_published.as_deref().unwrap_or_default()),
            url,
            category: CATEGORY.to_string(),
        }
    }

    /// RSS/Atom entry. `None` when the entry has neither a title nor a link.
    pub fn from_feed_entry(entry: &feed_rs::model::Entry) -> Option<Self> {
        let title = entry
            .title
            .as_ref()
            .map(|t| strip_tags(&t.content))
            .unwrap_or_default();
        let url = entry.links.first().map(|l| l.href.trim().to_string())?;
        if title.is_empty() || url.is_empty() {
            return None;
        }

        let body = entry.content.as_ref().and_then(|c| c.body.clone());
        let summary = entry.summary.as_ref().map(|s| s.content.clone());

        let image = entry
            .media
            .iter()
            .find_map(|m| {
                m.content
                    .iter()
                    .find_map(|c| c.url.as_ref().map(|u| u.as_str().to_string()))
                    .or_else(|| m.thumbnails.first().map(|t| t.image.uri.clone()))
            })
            .or_else(|| body.as_deref().and_then(fragment_image))
            .or_else(|| summary.as_deref().and_then(fragment_image))
            .unwrap_or_default();

        let date = entry
            .published
            .or(entry.updated)
            .map(format_iso)
            .unwrap_or_else(|| format_iso(Utc::now()));

        Some(Self {
            id: if entry.id.trim().is_empty() {
                url.clone()
            } else {
                entry.id.clone()
            },
            title: truncate_chars(&title, TITLE_LIMIT),
            excerpt: truncate_excerpt(&strip_tags(summary.as_deref().unwrap_or_default())),
            image,
            date,
            url,
            category: CATEGORY.to_string(),
        })
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        parse_source_date(&self.date)
    }

    pub fn is_event_like(&self) -> bool {
        let haystack = format!("{} {}", self.title, self.excerpt).to_lowercase();
        EVENT_KEYWORDS.iter().any(|k| haystack.contains(k))
    }
}

/// Whitespace is collapsed first; then the first sentence if it has at least
/// 10 characters, else the whole text, bounded to [`TITLE_LIMIT`].
pub fn derive_title(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return String::new();
    }

    let first_sentence = text.split(". ").next().unwrap_or(&text);
    let base = if first_sentence.chars().count() >= 10 {
        first_sentence
    } else {
        &text
    };
    truncate_chars(base, TITLE_LIMIT)
}

/// Bounded to [`EXCERPT_LIMIT`] characters, with `...` appended when cut.
pub fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_LIMIT {
        format!("{}...", text.chars().take(EXCERPT_LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}

pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect::<String>().trim_end().to_string()
}

/// Drops WordPress-style `-720x480` dimension suffixes to get the original asset.
pub fn strip_size_suffix(url: &str) -> String {
    SIZED_IMAGE.replace(url, ".$1").into_owned()
}

/// Keeps the first item per `url`, preserving order, then truncates to `limit`.
pub fn dedup_and_limit(items: Vec<FeedItem>, limit: usize) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .take(limit)
        .collect()
}

/// Appends items whose `url` is not already present, stopping at `limit`.
pub fn merge_unique(items: &mut Vec<FeedItem>, more: Vec<FeedItem>, limit: usize) {
    let mut seen: HashSet<String> = items.iter().map(|i| i.url.clone()).collect();
    for item in more {
        if items.len() >= limit {
            break;
        }
        if seen.insert(item.url.clone()) {
            items.push(item);
        }
    }
}

/// Newest first; unparseable dates sort last.
pub fn sort_newest_first(items: &mut [FeedItem]) {
    items.sort_by_key(|item| std::cmp::Reverse(item.published().map(|d| d.timestamp_millis())));
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn first_non_empty(values: &[&Option<String>]) -> String {
    values
        .iter()
        .find_map(|v| non_empty(v))
        .unwrap_or_default()
}

fn generated_id(title: &str, date: Option<&str>) -> String {
    let mut hasher = DefaultHasher::new();
    title.hash(&mut hasher);
    date.hash(&mut hasher);
    format!("item-{:016x}", hasher.finish())
}
