use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

lazy_static! {
    static ref POST_LINK: Regex = Regex::new(r"(story\.php|permalink\.php|/posts/)").unwrap();
    static ref NEXT_PAGE_HREF: Regex = Regex::new(r"(sectionLoadingID|cursor=|__tn__)").unwrap();
    static ref READ_MORE: Regex = Regex::new(r"(?i)See more|Показать полностью|Подробнее").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Preview image candidates, in priority order.
const META_IMAGE_CANDIDATES: &[(&str, &str)] = &[
    (r#"meta[property="og:image"]"#, "content"),
    (r#"meta[property="og:image:url"]"#, "content"),
    (r#"meta[name="twitter:image"]"#, "content"),
    (r#"meta[name="twitter:image:src"]"#, "content"),
    (r#"link[rel="apple-touch-icon"]"#, "href"),
    (r#"link[rel="icon"]"#, "href"),
];

/// Link labels that lead to the next page of a mobile timeline.
const NEXT_PAGE_LABELS: &[&str] = &["See more", "See More Posts", "Показать", "Показать ещё"];

/// A post permalink found on a page, together with what its enclosing block holds.
#[derive(Debug, Clone, PartialEq)]
pub struct PostBlock {
    pub href: String,
    pub text: String,
    pub image: String,
    pub date: String,
}

/// Parsed HTML document plus the URL it was fetched from.
///
/// Parsing never fails: malformed markup yields a partial tree and missing
/// elements come back as `None` or empty collections.
pub struct Page {
    document: Html,
    base: Option<Url>,
}

impl Page {
    pub fn parse(html: &str, base_url: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            base: Url::parse(base_url).ok(),
        }
    }

    /// Resolves `href` against the page URL. Absolute URLs pass through.
    pub fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        match &self.base {
            Some(base) => base.join(href).ok().map(String::from),
            None => Url::parse(href).ok().map(String::from),
        }
    }

    /// First non-empty `attr` of the elements matching `css`.
    pub fn attr(&self, css: &str, attr: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        self.document
            .select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(String::from)
    }

    pub fn first_image(&self) -> Option<String> {
        self.attr("img", "src")
    }

    /// First Open Graph / Twitter card / icon image declared by the page.
    pub fn meta_image(&self) -> Option<String> {
        META_IMAGE_CANDIDATES
            .iter()
            .find_map(|(css, attr)| self.attr(css, attr))
    }

    /// Like [`Page::meta_image`] with the first `<img>` as a last resort.
    pub fn preview_image(&self) -> Option<String> {
        self.meta_image().or_else(|| self.first_image())
    }

    /// Anchors that look like post permalinks, deduplicated by resolved href.
    pub fn post_blocks(&self) -> Vec<PostBlock> {
        let Ok(anchors) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut blocks: Vec<PostBlock> = Vec::new();
        for anchor in self.document.select(&anchors) {
            let raw = anchor.value().attr("href").unwrap_or_default().trim();
            if !POST_LINK.is_match(raw) {
                continue;
            }
            let Some(href) = self.resolve(raw) else {
                continue;
            };
            if blocks.iter().any(|b| b.href == href) {
                continue;
            }

            let container = enclosing_block(anchor).unwrap_or(anchor);
            let text = container.text().collect::<Vec<_>>().join(" ");
            let text = READ_MORE.replace_all(&text, " ").trim().to_string();

            let image = first_attr(container, "img", "src")
                .and_then(|src| self.resolve(&src))
                .unwrap_or_default();

            let date = first_element(container, "abbr, time")
                .map(|el| match el.value().attr("datetime") {
                    Some(dt) if !dt.trim().is_empty() => dt.trim().to_string(),
                    _ => el.text().collect::<String>().trim().to_string(),
                })
                .unwrap_or_default();

            blocks.push(PostBlock {
                href,
                text,
                image,
                date,
            });
        }
        blocks
    }

    /// Link to the next timeline page, if the page has one.
    pub fn next_page(&self) -> Option<String> {
        let anchors = Selector::parse("a[href]").ok()?;

        let by_label = NEXT_PAGE_LABELS.iter().find_map(|label| {
            self.document
                .select(&anchors)
                .find(|a| a.text().collect::<String>().contains(label))
                .and_then(|a| a.value().attr("href"))
        });

        let href = by_label.or_else(|| {
            self.document
                .select(&anchors)
                .filter_map(|a| a.value().attr("href"))
                .find(|href| NEXT_PAGE_HREF.is_match(href))
        })?;

        self.resolve(href)
    }
}

/// Collapses runs of whitespace and strips "read more" noise.
pub fn normalize_text(text: &str) -> String {
    let text = READ_MORE.replace_all(text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Text content of an HTML fragment, whitespace-collapsed.
pub fn strip_tags(fragment: &str) -> String {
    let fragment = Html::parse_fragment(fragment);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// First `<img src>` of an HTML fragment.
pub fn fragment_image(fragment: &str) -> Option<String> {
    let fragment = Html::parse_fragment(fragment);
    first_attr(fragment.root_element(), "img", "src")
}

/// Nearest ancestor that is an `article` or a `div`.
fn enclosing_block(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| matches!(el.value().name(), "article" | "div"))
}

fn first_element<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

fn first_attr(scope: ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    scope
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(String::from)
}
