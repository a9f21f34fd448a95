use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::http;

pub trait ObjectStorage {
    /// Stores `bytes` under `key` and returns the public URL for it.
    fn store(&self, bytes: &[u8], key: &str) -> anyhow::Result<String>;
}

pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn public_url(public_base_url: &str, key: &str) -> String {
    format!("{}/{}", public_base_url.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Writes objects below a directory that some web server exposes at
/// `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalDirStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalDirStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn object_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("object key must be a plain relative path: {key}");
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStorage for LocalDirStorage {
    fn store(&self, bytes: &[u8], key: &str) -> anyhow::Result<String> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("object path has no parent: {}", path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create object dir: {}", parent.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("create temp object in {}", parent.display()))?;
        tmp.write_all(bytes)
            .with_context(|| format!("write temp object for {key}"))?;
        tmp.persist(&path)
            .with_context(|| format!("persist object: {}", path.display()))?;

        tracing::debug!(key, path = %path.display(), bytes = bytes.len(), "stored object");
        Ok(public_url(&self.public_base_url, key))
    }
}

/// PUTs objects to a bucket-style endpoint (`{endpoint}/{key}`).
pub struct HttpPutStorage {
    client: Client,
    endpoint: String,
    public_base_url: String,
    auth_header: Option<String>,
}

impl HttpPutStorage {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        public_base_url: impl Into<String>,
        auth_header: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            public_base_url: public_base_url.into(),
            auth_header,
        }
    }
}

impl ObjectStorage for HttpPutStorage {
    fn store(&self, bytes: &[u8], key: &str) -> anyhow::Result<String> {
        let url = http::endpoint(&self.endpoint, key)?;
        let mut request = self
            .client
            .put(url.clone())
            .header(USER_AGENT, http::USER_AGENT_VALUE)
            .header(CONTENT_TYPE, content_type_for_key(key))
            .body(bytes.to_vec());
        if let Some(auth) = self.auth_header.as_deref() {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().with_context(|| format!("PUT {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("PUT {url}: unexpected status {status}: {}", body.trim());
        }

        tracing::debug!(key, %url, bytes = bytes.len(), "uploaded object");
        Ok(public_url(&self.public_base_url, key))
    }
}
