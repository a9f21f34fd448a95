use anyhow::Context as _;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

use crate::http;

pub const PUSHOVER_BASE_URL: &str = "https://api.pushover.net";

/// Best-effort operator notification. Implementations never fail the caller.
pub trait Notifier {
    fn notify(&self, subject: &str, message: &str);
}

/// Logs notifications instead of pushing them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, message: &str) {
        tracing::info!(subject, message, "notification");
    }
}

pub struct PushoverNotifier {
    client: Client,
    base_url: String,
    token: String,
    user: String,
}

impl PushoverNotifier {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            user: user.into(),
        }
    }

    fn send(&self, subject: &str, message: &str) -> anyhow::Result<()> {
        let url = http::endpoint(&self.base_url, "1/messages.json")?;
        let response = self
            .client
            .post(url.clone())
            .header(USER_AGENT, http::USER_AGENT_VALUE)
            .form(&[
                ("token", self.token.as_str()),
                ("user", self.user.as_str()),
                ("title", subject),
                ("message", message),
            ])
            .send()
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("pushover error ({status}): {}", body.trim());
        }
        Ok(())
    }
}

impl Notifier for PushoverNotifier {
    fn notify(&self, subject: &str, message: &str) {
        if let Err(err) = self.send(subject, message) {
            tracing::warn!(subject, err = format!("{err:#}"), "push notification failed");
        }
    }
}
