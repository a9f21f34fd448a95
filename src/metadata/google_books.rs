use reqwest::blocking::Client;
use serde_json::Value;

use crate::book::RawBook;
use crate::error::PipelineError;
use crate::http;
use crate::isbn::Isbn;
use crate::metadata::MetadataProvider;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const NAME: &str = "google_books";

pub struct GoogleBooks {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooks {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

impl MetadataProvider for GoogleBooks {
    fn name(&self) -> &'static str {
        NAME
    }

    fn lookup(&self, isbn: &Isbn) -> Result<Option<RawBook>, PipelineError> {
        let mut url = http::endpoint(&self.base_url, "books/v1/volumes")
            .map_err(|err| PipelineError::provider(NAME, format!("{err:#}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("country", "US");
            query.append_pair("q", &format!("isbn:{isbn}"));
            if let Some(key) = self.api_key.as_deref() {
                query.append_pair("key", key);
            }
        }

        let body = http::get_json(&self.client, &url)
            .map_err(|err| PipelineError::provider(NAME, format!("{err:#}")))?;
        Ok(parse_volumes(&body))
    }
}

/// Maps a `volumes` search response onto [`RawBook`], taking the first item.
pub fn parse_volumes(body: &Value) -> Option<RawBook> {
    let total = body.get("totalItems").and_then(Value::as_u64).unwrap_or(0);
    if total == 0 {
        return None;
    }
    let info = body.pointer("/items/0/volumeInfo")?;

    let authors = info
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Some(RawBook {
        title: string_field(info, "title"),
        subtitle: string_field(info, "subtitle"),
        authors,
        published_date: string_field(info, "publishedDate"),
        description: string_field(info, "description"),
        publisher: string_field(info, "publisher"),
        page_count: info
            .get("pageCount")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        cover_url: best_image_link(info),
    })
}

fn string_field(info: &Value, key: &str) -> Option<String> {
    info.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn best_image_link(info: &Value) -> Option<String> {
    let links = info.get("imageLinks")?;
    ["extraLarge", "large", "medium", "thumbnail", "smallThumbnail"]
        .iter()
        .find_map(|key| links.get(*key).and_then(Value::as_str))
        .filter(|link| !link.trim().is_empty())
        .map(|link| match link.strip_prefix("http://") {
            Some(rest) => format!("https://{rest}"),
            None => link.to_owned(),
        })
}
