use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::{Fetcher, Plan};
use crate::html::Page;
use crate::normalize::{merge_unique, FeedItem, GraphPost};

const POST_FIELDS: &str = "id,message,story,created_time,permalink_url,full_picture";

/// Upper bound on timeline pages followed per scrape.
pub const MAX_TIMELINE_PAGES: usize = 5;

lazy_static! {
    static ref VIDEO_URL: Regex = Regex::new(r"(?i)/videos/").unwrap();
}

/// Latest posts of a page through the Graph API.
pub async fn fetch_graph_posts(
    fetcher: &Fetcher,
    graph_base: &str,
    page_id: &str,
    token: &str,
    limit: usize,
) -> Result<Vec<FeedItem>> {
    let mut url = Url::parse(graph_base)?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .push(page_id)
        .push("posts");
    url.query_pairs_mut()
        .append_pair("fields", POST_FIELDS)
        .append_pair("limit", &limit.max(1).to_string())
        .append_pair("access_token", token);

    let json: Value = fetcher.get_json(url.as_str()).await?;
    let posts = json
        .get("data")
        .and_then(Value::as_array)
        .map(|data| {
            data.iter()
                .filter_map(|post| serde_json::from_value::<GraphPost>(post.clone()).ok())
                .map(|post| FeedItem::from_graph_post(&post))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    info!(page_id, count = posts.len(), "fetched graph posts");
    Ok(posts)
}

/// Thumbnail for a post or video permalink via the Graph oEmbed endpoints.
pub async fn fetch_oembed_image(
    fetcher: &Fetcher,
    graph_base: &str,
    token: &str,
    post_url: &str,
) -> Result<Option<String>> {
    let endpoint = if VIDEO_URL.is_match(post_url) {
        "oembed_video"
    } else {
        "oembed_post"
    };
    let api = Url::parse_with_params(
        &format!("{}/{endpoint}", graph_base.trim_end_matches('/')),
        &[("url", post_url), ("access_token", token)],
    )?;

    let json: Value = fetcher.get_json(api.as_str()).await?;
    let image = ["thumbnail_url", "author_photo"]
        .iter()
        .filter_map(|key| json.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from);
    Ok(image)
}

/// Timeline pages to try for a page id, best first.
pub fn timeline_candidates(mobile_base: &str, basic_base: &str, page_id: &str) -> Vec<String> {
    let id: String = url::form_urlencoded::byte_serialize(page_id.as_bytes()).collect();
    let mobile = mobile_base.trim_end_matches('/');
    let basic = basic_base.trim_end_matches('/');
    vec![
        format!("{mobile}/profile.php?id={id}&v=timeline"),
        format!("{mobile}/{id}/posts"),
        format!("{basic}/profile.php?id={id}&v=timeline"),
    ]
}

/// Scrapes the public mobile timeline of a page without any token, following
/// "next page" links until `limit` posts are collected.
///
/// Proxied fetches only; a direct request is answered with a 200 login page.
pub async fn scrape_timeline(fetcher: &Fetcher, page_id: &str, limit: usize) -> Result<Vec<FeedItem>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let upstreams = fetcher.upstreams();
    let plan = Plan::proxied(upstreams);

    let mut first = None;
    for candidate in timeline_candidates(&upstreams.mobile_base, &upstreams.basic_base, page_id) {
        match fetcher.fetch(&candidate, &plan).await {
            Ok(content) => {
                first = Some((candidate, content.text()));
                break;
            }
            Err(e) => debug!(url = %candidate, error = %e, "timeline candidate failed"),
        }
    }
    let Some((mut page_url, mut html)) = first else {
        return Err(Error::Exhausted(format!("timeline of {page_id}")));
    };

    let mut collected: Vec<FeedItem> = Vec::new();
    for _ in 0..MAX_TIMELINE_PAGES {
        let (items, next) = {
            let page = Page::parse(&html, &page_url);
            let items = page
                .post_blocks()
                .iter()
                .map(FeedItem::from_post_block)
                .collect::<Vec<_>>();
            (items, page.next_page())
        };
        merge_unique(&mut collected, items, limit);

        if collected.len() >= limit {
            break;
        }
        let Some(next) = next else {
            break;
        };
        match fetcher.fetch(&next, &plan).await {
            Ok(content) => {
                html = content.text();
                page_url = next;
            }
            Err(e) => {
                warn!(url = %next, error = %e, "timeline pagination stopped");
                break;
            }
        }
    }

    info!(page_id, count = collected.len(), "scraped timeline posts");
    Ok(collected)
}
