//! Cover image URL resolution. Independent of the metadata chain: it may read
//! the canonical record, but it has its own ordered list of sources and it
//! always produces a URL.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::blocking::Client;
use serde_json::Value;
use url::Url;

use crate::book::CanonicalBook;
use crate::error::PipelineError;
use crate::http;
use crate::isbn::Isbn;
use crate::metadata::open_library::books_api_url;

/// 1x1 neutral image used when no source produces a cover.
pub const PLACEHOLDER_COVER_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/c/ca/1x1.png";

pub trait CoverSource {
    fn name(&self) -> &'static str;

    fn lookup(&self, isbn: &Isbn, book: &CanonicalBook) -> Result<Option<String>, PipelineError>;
}

pub struct CoverResolver {
    sources: Vec<Box<dyn CoverSource>>,
    placeholder: String,
}

impl CoverResolver {
    pub fn new(sources: Vec<Box<dyn CoverSource>>, placeholder: impl Into<String>) -> Self {
        Self {
            sources,
            placeholder: placeholder.into(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn resolve(&self, isbn: &Isbn, book: &CanonicalBook) -> String {
        for source in &self.sources {
            match source.lookup(isbn, book) {
                Ok(Some(url)) if !url.trim().is_empty() => {
                    tracing::info!(source = source.name(), %isbn, %url, "resolved cover");
                    return url.trim().to_owned();
                }
                Ok(_) => {
                    tracing::debug!(source = source.name(), %isbn, "no cover candidate");
                }
                Err(err) => {
                    tracing::warn!(source = source.name(), %isbn, %err, "cover source failed");
                }
            }
        }

        tracing::info!(%isbn, "no cover found; using placeholder");
        self.placeholder.clone()
    }
}

/// The direct image URL some metadata providers already hand out.
pub struct EmbeddedCover;

impl CoverSource for EmbeddedCover {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn lookup(&self, _isbn: &Isbn, book: &CanonicalBook) -> Result<Option<String>, PipelineError> {
        Ok(book.cover_url.clone())
    }
}

/// Open Library edition id → `covers.openlibrary.org/b/olid/{olid}-L.jpg`.
pub struct OpenLibraryCoverApi {
    client: Client,
    base_url: String,
    covers_base_url: String,
}

impl OpenLibraryCoverApi {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        covers_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            covers_base_url: covers_base_url.into(),
        }
    }
}

impl CoverSource for OpenLibraryCoverApi {
    fn name(&self) -> &'static str {
        "open_library_covers"
    }

    fn lookup(&self, isbn: &Isbn, _book: &CanonicalBook) -> Result<Option<String>, PipelineError> {
        let url = books_api_url(&self.base_url, isbn, "data")
            .map_err(|err| PipelineError::provider(self.name(), format!("{err:#}")))?;
        let body = http::get_json(&self.client, &url)
            .map_err(|err| PipelineError::provider(self.name(), format!("{err:#}")))?;

        let olid = body
            .get(format!("ISBN:{isbn}"))
            .and_then(|info| info.pointer("/identifiers/openlibrary/0"))
            .and_then(Value::as_str)
            .filter(|olid| !olid.trim().is_empty());

        Ok(olid.map(|olid| {
            format!(
                "{}/b/olid/{}-L.jpg",
                self.covers_base_url.trim_end_matches('/'),
                olid.trim()
            )
        }))
    }
}

/// Last resort: fetch the human-facing ISBN page and pull the cover `<img>`.
pub struct OpenLibraryPageScrape {
    client: Client,
    base_url: String,
}

impl OpenLibraryPageScrape {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl CoverSource for OpenLibraryPageScrape {
    fn name(&self) -> &'static str {
        "open_library_page"
    }

    fn lookup(&self, isbn: &Isbn, _book: &CanonicalBook) -> Result<Option<String>, PipelineError> {
        let url = http::endpoint(&self.base_url, &format!("isbn/{isbn}"))
            .map_err(|err| PipelineError::provider(self.name(), format!("{err:#}")))?;
        let html = http::get_text(&self.client, &url)
            .map_err(|err| PipelineError::provider(self.name(), format!("{err:#}")))?;
        Ok(extract_cover_src(&html, &url))
    }
}

fn img_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid img regex"))
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("valid attribute regex")
    })
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    attr_regex().captures_iter(tag).find_map(|caps| {
        let key = caps.get(1)?.as_str();
        if !key.eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str())
    })
}

fn is_cover_element(tag: &str) -> bool {
    let has_cover_class = attribute(tag, "class").is_some_and(|class| {
        class
            .split_whitespace()
            .any(|token| token.to_ascii_lowercase().contains("cover"))
    });
    let is_item_image =
        attribute(tag, "itemprop").is_some_and(|prop| prop.trim().eq_ignore_ascii_case("image"));
    has_cover_class || is_item_image
}

/// Finds the first cover `<img>` and resolves its `src` against the page URL.
pub fn extract_cover_src(html: &str, page_url: &Url) -> Option<String> {
    img_tag_regex()
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| is_cover_element(tag))
        .find_map(|tag| {
            let src = attribute(tag, "src")
                .or_else(|| attribute(tag, "data-src"))?
                .trim();
            if src.is_empty() || src.starts_with("data:") {
                return None;
            }
            page_url.join(src).ok().map(|url| url.to_string())
        })
}
