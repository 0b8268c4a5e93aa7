use actix_web::web;
use chrono::Duration;
use clap::Parser;

pub mod api;
pub mod cache;
pub mod custom_date;
pub mod error;
pub mod facebook;
pub mod feeds;
pub mod fetch;
pub mod html;
pub mod normalize;

use cache::ResultCache;
use error::Result;
use fetch::{Fetcher, Upstreams};
use normalize::FeedItem;

pub const DEFAULT_FEED_URL: &str = "https://rss.app/feeds/v1.1/yneQwQdZWmbASmAF.json";
pub const DEFAULT_PAGE_ID: &str = "61562124174747";
pub const DEFAULT_NEWS_URL: &str =
    "https://news.google.com/rss/search?q=site%3Abwfbadminton.com&hl=ru&gl=RU&ceid=RU:ru";

#[derive(Parser, Debug, Clone)]
#[clap(about, version, author)]
pub struct Args {
    #[clap(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, default_value = "3000")]
    pub port: u16,

    #[clap(long, env = "FB_PAGE_ID")]
    pub fb_page_id: Option<String>,

    #[clap(long, env = "FB_ACCESS_TOKEN", hide_env_values = true)]
    pub fb_access_token: Option<String>,

    #[clap(long, env = "SCRAPERAPI_KEY", hide_env_values = true)]
    pub scraperapi_key: Option<String>,

    #[clap(long, env = "SCRAPINGBEE_KEY", hide_env_values = true)]
    pub scrapingbee_key: Option<String>,

    #[clap(long, env = "RSS_APP_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub rss_app_feed_url: String,

    /// Page scraped when FB_PAGE_ID is not set.
    #[clap(long, default_value = DEFAULT_PAGE_ID)]
    pub fallback_page_id: String,

    #[clap(long, default_value = "https://graph.facebook.com/v18.0")]
    pub graph_api_base: String,

    #[clap(long, default_value = "https://m.facebook.com")]
    pub mobile_base: String,

    #[clap(long, default_value = "https://mbasic.facebook.com")]
    pub basic_base: String,

    #[clap(long, default_value = "https://r.jina.ai")]
    pub read_proxy_base: String,

    #[clap(long, default_value = "https://api.scraperapi.com")]
    pub scraperapi_base: String,

    #[clap(long, default_value = "https://app.scrapingbee.com/api/v1/")]
    pub scrapingbee_base: String,

    #[clap(long, default_value = "https://images.weserv.nl/")]
    pub image_cdn_base: String,

    #[clap(long, default_value = DEFAULT_NEWS_URL)]
    pub news_url: String,

    #[clap(long, default_value = "https://bwfbadminton.com/feed/")]
    pub news_fallback_url: String,

    /// Hosts the image proxy is willing to re-serve.
    #[clap(long, value_delimiter = ',', default_value = "fbcdn.net,facebook.com")]
    pub image_proxy_hosts: Vec<String>,
}

impl Args {
    pub fn page_id(&self) -> Option<&str> {
        configured(&self.fb_page_id)
    }

    pub fn access_token(&self) -> Option<&str> {
        configured(&self.fb_access_token)
    }

    /// Page id for tokenless scraping, which always has something to try.
    pub fn scrape_page_id(&self) -> &str {
        self.page_id().unwrap_or(&self.fallback_page_id)
    }

    pub fn upstreams(&self) -> Upstreams {
        Upstreams {
            mobile_base: self.mobile_base.clone(),
            basic_base: self.basic_base.clone(),
            read_proxy_base: self.read_proxy_base.clone(),
            scraperapi_base: self.scraperapi_base.clone(),
            scrapingbee_base: self.scrapingbee_base.clone(),
            image_cdn_base: self.image_cdn_base.clone(),
            scraperapi_key: configured(&self.scraperapi_key).map(String::from),
            scrapingbee_key: configured(&self.scrapingbee_key).map(String::from),
        }
    }
}

fn configured(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// One cache per endpoint; TTLs and key granularity differ between them.
pub struct Caches {
    pub graph_posts: ResultCache<Vec<FeedItem>>,
    pub scraped_posts: ResultCache<Vec<FeedItem>>,
    pub rss_posts: ResultCache<Vec<FeedItem>>,
    pub club_feed: ResultCache<Vec<FeedItem>>,
    pub social_feed: ResultCache<Vec<FeedItem>>,
    pub news: ResultCache<Vec<FeedItem>>,
    /// Keyed by requested page URL.
    pub og_images: ResultCache<Option<String>>,
}

impl Default for Caches {
    fn default() -> Self {
        Self {
            graph_posts: ResultCache::new(Duration::minutes(15)),
            scraped_posts: ResultCache::new(Duration::minutes(15)),
            rss_posts: ResultCache::new(Duration::minutes(15)),
            club_feed: ResultCache::new(Duration::minutes(15)),
            social_feed: ResultCache::new(Duration::minutes(10)),
            news: ResultCache::new(Duration::minutes(10)),
            og_images: ResultCache::new(Duration::hours(1)),
        }
    }
}

pub struct AppState {
    pub config: Args,
    pub fetcher: Fetcher,
    pub caches: Caches,
}

impl AppState {
    pub fn new(config: Args) -> Result<Self> {
        let fetcher = Fetcher::new(config.upstreams())?;
        Ok(Self {
            config,
            fetcher,
            caches: Caches::default(),
        })
    }
}

/// Registers every endpoint; shared by the server binary and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(api::posts::fb_posts)
        .service(api::posts::fb_scrape)
        .service(api::posts::fb_rss)
        .service(api::posts::rss_club)
        .service(api::posts::fb_feed)
        .service(api::images::fb_og)
        .service(api::images::fb_preview)
        .service(api::images::og)
        .service(api::images::image_proxy)
        .service(api::images::image_resize)
        .service(api::news::bwf_news)
        .service(api::debug::debug_env);
}
