use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// Identifies the service on direct API calls.
pub const BOT_USER_AGENT: &str = "Mozilla/5.0 (compatible; AltiusSiteBot/1.0; +https://badm-land-main.vercel.app)";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const IMAGE_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const CRAWLER_USER_AGENT: &str = "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)";
const IMAGE_PROXY_USER_AGENT: &str = "Mozilla/5.0 (compatible; ImageProxy/1.0)";

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/*,*/*;q=0.8";

/// Per-attempt timeout for image fetches.
pub const IMAGE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream locations and scraping-proxy credentials.
#[derive(Debug, Clone)]
pub struct Upstreams {
    pub mobile_base: String,
    pub basic_base: String,
    pub read_proxy_base: String,
    pub scraperapi_base: String,
    pub scrapingbee_base: String,
    pub image_cdn_base: String,
    pub scraperapi_key: Option<String>,
    pub scrapingbee_key: Option<String>,
}

impl Upstreams {
    /// Same page on the mobile site; `None` unless `target` is a desktop social URL.
    pub fn mobile_variant(&self, target: &str) -> Option<String> {
        rebase_social_url(target, &self.mobile_base)
    }

    /// Same page on the lite HTML site.
    pub fn basic_variant(&self, target: &str) -> Option<String> {
        rebase_social_url(target, &self.basic_base)
    }
}

/// One way of retrieving a remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Mobile,
    Basic,
    ReadProxy,
    ScraperApi { api_key: String },
    ScrapingBee { api_key: String },
    /// Image fetch announcing itself as the platform's own link crawler.
    Crawler,
    /// Image fetch posing as a browser coming from the mobile site.
    Browser,
    /// Image re-encoded through a public image CDN.
    ImageCdn,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Mobile => "mobile",
            Strategy::Basic => "basic",
            Strategy::ReadProxy => "read_proxy",
            Strategy::ScraperApi { .. } => "scraperapi",
            Strategy::ScrapingBee { .. } => "scrapingbee",
            Strategy::Crawler => "crawler",
            Strategy::Browser => "browser",
            Strategy::ImageCdn => "image_cdn",
        }
    }

    /// URL actually requested for `target`. `None` means the strategy does not
    /// apply to this target and is skipped.
    pub fn request_url(&self, target: &str, upstreams: &Upstreams) -> Option<String> {
        match self {
            Strategy::Direct | Strategy::Crawler | Strategy::Browser => Some(target.to_string()),
            Strategy::Mobile => upstreams.mobile_variant(target),
            Strategy::Basic => upstreams.basic_variant(target),
            Strategy::ReadProxy => Some(format!(
                "{}/http://{}",
                upstreams.read_proxy_base.trim_end_matches('/'),
                strip_scheme(target)
            )),
            Strategy::ScraperApi { api_key } => Url::parse_with_params(
                &upstreams.scraperapi_base,
                &[("api_key", api_key.as_str()), ("url", target), ("country", "de")],
            )
            .ok()
            .map(String::from),
            Strategy::ScrapingBee { api_key } => Url::parse_with_params(
                &upstreams.scrapingbee_base,
                &[
                    ("api_key", api_key.as_str()),
                    ("url", target),
                    ("render_js", "false"),
                    ("block_resources", "false"),
                    ("country_code", "de"),
                ],
            )
            .ok()
            .map(String::from),
            Strategy::ImageCdn => Url::parse_with_params(
                &upstreams.image_cdn_base,
                &[("url", target), ("output", "jpg"), ("q", "85")],
            )
            .ok()
            .map(String::from),
        }
    }

    /// Address of the document this strategy returns for `target`, for
    /// resolving relative links. Proxies return the target page itself.
    pub fn page_url(&self, target: &str, upstreams: &Upstreams) -> String {
        match self {
            Strategy::Mobile | Strategy::Basic => self
                .request_url(target, upstreams)
                .unwrap_or_else(|| target.to_string()),
            _ => target.to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            Strategy::Crawler => {
                headers.insert(USER_AGENT, HeaderValue::from_static(CRAWLER_USER_AGENT));
            }
            Strategy::Browser => {
                headers.insert(USER_AGENT, HeaderValue::from_static(IMAGE_BROWSER_USER_AGENT));
                headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
                headers.insert(REFERER, HeaderValue::from_static("https://m.facebook.com/"));
            }
            Strategy::ImageCdn => {
                headers.insert(USER_AGENT, HeaderValue::from_static(IMAGE_PROXY_USER_AGENT));
            }
            _ => {
                headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
                headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
                headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            }
        }
        headers
    }
}

/// Ordered strategies plus an optional per-attempt timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub strategies: Vec<Strategy>,
    pub attempt_timeout: Option<Duration>,
}

impl Plan {
    /// Generic page scrape: direct, mobile, basic, keyless read proxy, then
    /// whichever paid proxies have a key.
    pub fn page(upstreams: &Upstreams) -> Self {
        let mut strategies = vec![
            Strategy::Direct,
            Strategy::Mobile,
            Strategy::Basic,
            Strategy::ReadProxy,
        ];
        strategies.extend(paid_strategies(upstreams));
        Self {
            strategies,
            attempt_timeout: None,
        }
    }

    /// Proxied fetch only: paid proxies when configured, the read proxy last.
    pub fn proxied(upstreams: &Upstreams) -> Self {
        let mut strategies = paid_strategies(upstreams);
        strategies.push(Strategy::ReadProxy);
        Self {
            strategies,
            attempt_timeout: None,
        }
    }

    pub fn image() -> Self {
        Self {
            strategies: vec![Strategy::Crawler, Strategy::Browser, Strategy::ImageCdn],
            attempt_timeout: Some(IMAGE_ATTEMPT_TIMEOUT),
        }
    }
}

fn paid_strategies(upstreams: &Upstreams) -> Vec<Strategy> {
    let mut strategies = Vec::new();
    if let Some(api_key) = &upstreams.scraperapi_key {
        strategies.push(Strategy::ScraperApi {
            api_key: api_key.clone(),
        });
    }
    if let Some(api_key) = &upstreams.scrapingbee_key {
        strategies.push(Strategy::ScrapingBee {
            api_key: api_key.clone(),
        });
    }
    strategies
}

/// Body of a successful (2xx) attempt.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub strategy: Strategy,
}

impl RawContent {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct Fetcher {
    client: Client,
    upstreams: Upstreams,
}

impl Fetcher {
    pub fn new(upstreams: Upstreams) -> Result<Self> {
        let client = Client::builder().user_agent(BOT_USER_AGENT).build()?;
        Ok(Self { client, upstreams })
    }

    pub fn upstreams(&self) -> &Upstreams {
        &self.upstreams
    }

    /// One attempt, no retries. Anything but a 2xx is an error.
    pub async fn attempt(
        &self,
        strategy: &Strategy,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<RawContent> {
        let url = strategy
            .request_url(target, &self.upstreams)
            .ok_or_else(|| Error::Exhausted(target.to_string()))?;

        let mut request = self.client.get(&url).headers(strategy.headers());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?.to_vec();

        Ok(RawContent {
            body,
            content_type,
            strategy: strategy.clone(),
        })
    }

    /// Tries each applicable strategy in order and returns the first success.
    pub async fn fetch(&self, target: &str, plan: &Plan) -> Result<RawContent> {
        for strategy in &plan.strategies {
            if strategy.request_url(target, &self.upstreams).is_none() {
                continue;
            }
            debug!(strategy = strategy.name(), url = target, "fetch attempt");
            match self.attempt(strategy, target, plan.attempt_timeout).await {
                Ok(content) => return Ok(content),
                Err(e) => warn!(strategy = strategy.name(), url = target, error = %e, "fetch strategy failed"),
            }
        }
        Err(Error::Exhausted(target.to_string()))
    }

    /// Direct GET of a JSON API.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Status(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Direct GET returning the raw body.
    pub async fn get_raw(&self, url: &str) -> Result<RawContent> {
        self.attempt(&Strategy::Direct, url, None).await
    }
}

fn strip_scheme(target: &str) -> &str {
    target
        .strip_prefix("https://")
        .or_else(|| target.strip_prefix("http://"))
        .unwrap_or(target)
}

fn rebase_social_url(target: &str, base: &str) -> Option<String> {
    let url = Url::parse(target).ok()?;
    if !matches!(url.host_str(), Some("www.facebook.com" | "facebook.com")) {
        return None;
    }
    let mut rebased = format!("{}{}", base.trim_end_matches('/'), url.path());
    if let Some(query) = url.query() {
        rebased.push('?');
        rebased.push_str(query);
    }
    Some(rebased)
}
