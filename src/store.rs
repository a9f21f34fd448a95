//! Document store seam. The pipeline only needs "list records still carrying
//! the pending marker" and "patch one record".

use anyhow::Context as _;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::{Value, json};
use thiserror::Error;

use crate::http;

pub const NOTION_BASE_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";
pub const TITLE_PROPERTY: &str = "Name";
pub const ISBN_PROPERTY: &str = "ISBN";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub id: String,
    /// Store-native property map (`properties` for Notion).
    pub fields: Value,
}

impl PendingRecord {
    pub fn title(&self) -> Option<String> {
        plain_text(self.fields.get(TITLE_PROPERTY)?.get("title")?)
    }

    pub fn isbn_text(&self) -> Option<String> {
        plain_text(self.fields.get(ISBN_PROPERTY)?.get("rich_text")?)
    }
}

fn plain_text(rich_text: &Value) -> Option<String> {
    let text = rich_text
        .as_array()?
        .iter()
        .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
        .collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.to_owned())
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("({status}) {code}: {message}")]
pub struct StoreError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

pub trait DocumentStore {
    fn list_pending(&self, marker: &str) -> anyhow::Result<Vec<PendingRecord>>;

    fn patch(&self, id: &str, fields: &Value) -> Result<(), StoreError>;
}

pub struct NotionStore {
    client: Client,
    base_url: String,
    token: String,
    database_id: String,
}

impl NotionStore {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            database_id: database_id.into(),
        }
    }

    fn query_page(&self, marker: &str, cursor: Option<&str>) -> anyhow::Result<Value> {
        let url = http::endpoint(
            &self.base_url,
            &format!("v1/databases/{}/query", self.database_id),
        )?;
        let mut body = json!({
            "filter": { "property": TITLE_PROPERTY, "title": { "contains": marker } },
            "page_size": PAGE_SIZE,
        });
        if let Some(cursor) = cursor
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("start_cursor".to_owned(), json!(cursor));
        }

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .header(USER_AGENT, http::USER_AGENT_VALUE)
            .json(&body)
            .send()
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        let raw = response.text().context("read notion query response")?;
        if !status.is_success() {
            let err = parse_error(status.as_u16(), &raw);
            anyhow::bail!("notion query failed {err}");
        }
        serde_json::from_str(&raw).context("parse notion query response")
    }
}

fn parse_error(status: u16, raw: &str) -> StoreError {
    let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
    let code = value
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| raw.trim().to_owned());
    StoreError {
        status,
        code,
        message,
    }
}

fn parse_results(page: &Value) -> Vec<PendingRecord> {
    page.get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| {
                    let id = result.get("id")?.as_str()?.to_owned();
                    let fields = result.get("properties").cloned().unwrap_or(Value::Null);
                    Some(PendingRecord { id, fields })
                })
                .collect()
        })
        .unwrap_or_default()
}

impl DocumentStore for NotionStore {
    fn list_pending(&self, marker: &str) -> anyhow::Result<Vec<PendingRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .query_page(marker, cursor.as_deref())
                .context("query pending records")?;
            records.extend(parse_results(&page));

            let has_more = page.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            cursor = page
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_owned);
            if !has_more || cursor.is_none() {
                break;
            }
        }
        tracing::debug!(count = records.len(), "listed pending records");
        Ok(records)
    }

    fn patch(&self, id: &str, fields: &Value) -> Result<(), StoreError> {
        let transport = |reason: String| StoreError {
            status: 0,
            code: "transport_error".to_owned(),
            message: reason,
        };

        let url = http::endpoint(&self.base_url, &format!("v1/pages/{id}"))
            .map_err(|err| transport(format!("{err:#}")))?;
        let response = self
            .client
            .patch(url.clone())
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .header(USER_AGENT, http::USER_AGENT_VALUE)
            .json(fields)
            .send()
            .map_err(|err| transport(format!("PATCH {url}: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let raw = response.text().unwrap_or_default();
        Err(parse_error(status.as_u16(), &raw))
    }
}
