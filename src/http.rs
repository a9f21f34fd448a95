use std::time::Duration;

use anyhow::Context as _;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

pub const USER_AGENT_VALUE: &str = concat!("bookshelf-enricher/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")
}

fn send_get(client: &Client, url: &Url, accept: &str) -> anyhow::Result<Response> {
    tracing::debug!(%url, "GET");
    let response = client
        .get(url.clone())
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(ACCEPT, accept)
        .send()
        .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {url}: unexpected status {status}");
    }
    Ok(response)
}

pub fn get_json(client: &Client, url: &Url) -> anyhow::Result<serde_json::Value> {
    send_get(client, url, "application/json")?
        .json::<serde_json::Value>()
        .with_context(|| format!("parse json from {url}"))
}

pub fn get_text(client: &Client, url: &Url) -> anyhow::Result<String> {
    send_get(client, url, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")?
        .text()
        .with_context(|| format!("read body from {url}"))
}

pub fn get_bytes(client: &Client, url: &Url) -> anyhow::Result<Vec<u8>> {
    let bytes = send_get(client, url, "image/*,*/*;q=0.8")?
        .bytes()
        .with_context(|| format!("read body from {url}"))?;
    Ok(bytes.to_vec())
}

/// Joins `path` onto a configurable base URL, keeping any path prefix the
/// base already carries (`http://127.0.0.1:1234/google` + `books/v1/volumes`).
pub fn endpoint(base_url: &str, path: &str) -> anyhow::Result<Url> {
    let base_url = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base_url}/{path}")).with_context(|| format!("parse url {base_url}/{path}"))
}
