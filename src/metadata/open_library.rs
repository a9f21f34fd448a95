use reqwest::blocking::Client;
use serde_json::Value;

use crate::book::RawBook;
use crate::error::PipelineError;
use crate::http;
use crate::isbn::Isbn;
use crate::metadata::MetadataProvider;

pub const DEFAULT_BASE_URL: &str = "https://openlibrary.org";
pub const DEFAULT_COVERS_BASE_URL: &str = "https://covers.openlibrary.org";
const NAME: &str = "open_library";

pub struct OpenLibraryBooks {
    client: Client,
    base_url: String,
    covers_base_url: String,
}

impl OpenLibraryBooks {
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

/// `api/books?bibkeys=ISBN:{isbn}&jscmd={jscmd}&format=json`
pub fn books_api_url(base_url: &str, isbn: &Isbn, jscmd: &str) -> anyhow::Result<url::Url> {
    let mut url = http::endpoint(base_url, "api/books")?;
    url.query_pairs_mut()
        .append_pair("bibkeys", &format!("ISBN:{isbn}"))
        .append_pair("jscmd", jscmd)
        .append_pair("format", "json");
    Ok(url)
}

impl MetadataProvider for OpenLibraryBooks {
    fn name(&self) -> &'static str {
        NAME
    }

    fn lookup(&self, isbn: &Isbn) -> Result<Option<RawBook>, PipelineError> {
        let url = books_api_url(&self.base_url, isbn, "details")
            .map_err(|err| PipelineError::provider(NAME, format!("{err:#}")))?;
        let body = http::get_json(&self.client, &url)
            .map_err(|err| PipelineError::provider(NAME, format!("{err:#}")))?;
        Ok(parse_details(&body, isbn, &self.covers_base_url))
    }
}

/// Maps a `jscmd=details` response onto [`RawBook`].
///
/// Open Library is inconsistent about nested shapes: `description` is either
/// a string or `{ "type": ..., "value": ... }`, and `publishers` holds either
/// strings or `{ "name": ... }` objects.
pub fn parse_details(body: &Value, isbn: &Isbn, covers_base_url: &str) -> Option<RawBook> {
    let details = body.get(format!("ISBN:{isbn}"))?.get("details")?;

    let authors = details
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| authors.iter().filter_map(name_of).collect())
        .unwrap_or_default();

    let publisher = details
        .get("publishers")
        .and_then(Value::as_array)
        .and_then(|publishers| publishers.iter().find_map(name_of));

    let cover_url = details
        .get("covers")
        .and_then(Value::as_array)
        .and_then(|covers| covers.iter().filter_map(Value::as_i64).find(|id| *id > 0))
        .map(|id| {
            format!(
                "{}/b/id/{id}-L.jpg",
                covers_base_url.trim_end_matches('/')
            )
        });

    Some(RawBook {
        title: details.get("title").and_then(Value::as_str).map(str::to_owned),
        subtitle: details
            .get("subtitle")
            .and_then(Value::as_str)
            .map(str::to_owned),
        authors,
        published_date: details
            .get("publish_date")
            .and_then(Value::as_str)
            .map(str::to_owned),
        description: details.get("description").and_then(text_of),
        publisher,
        page_count: details
            .get("number_of_pages")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        cover_url,
    })
}

fn name_of(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(obj) => obj.get("value").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}
