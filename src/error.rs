use thiserror::Error;

/// Per-record failures. Every variant is caught at the pipeline boundary;
/// none of them stops the rest of a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("no metadata found for ISBN {isbn}")]
    NotFound { isbn: String },

    #[error("cover image unusable ({url}): {reason}")]
    ImageUnusable { url: String, reason: String },

    #[error("store asset {key}: {reason}")]
    Storage { key: String, reason: String },

    #[error("document store rejected update ({status}): {code}: {message}")]
    WriteFailure {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed record {record_id}: {reason}")]
    MalformedRecord { record_id: String, reason: String },
}

impl PipelineError {
    pub fn provider(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::ProviderUnavailable {
            provider,
            reason: err.to_string(),
        }
    }

    /// Subject line used when the error is pushed to the operator.
    pub fn subject(&self) -> String {
        match self {
            Self::ProviderUnavailable { provider, .. } => format!("Provider {provider} failed"),
            Self::NotFound { isbn } => format!("No data found for ISBN: {isbn}"),
            Self::ImageUnusable { .. } => "Cover image unusable".to_owned(),
            Self::Storage { .. } => "Asset upload failed".to_owned(),
            Self::WriteFailure { status, code, .. } => format!("Error {status}: {code}"),
            Self::MalformedRecord { .. } => "Error reading book page".to_owned(),
        }
    }

    /// Operator-facing body for the notification.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound { isbn } => {
                format!("Check for another ISBN. No data was found for ISBN: {isbn}")
            }
            Self::WriteFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
