use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{ProviderArgs, ServiceArgs, StorageBackend};

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub google_api_key: Option<String>,
    pub google_books_base_url: String,
    pub open_library_base_url: String,
    pub open_library_covers_base_url: String,
    pub placeholder_cover_url: String,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub base_url: String,
    pub token: String,
    pub database_id: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    LocalDir {
        dir: PathBuf,
        public_base_url: String,
    },
    HttpPut {
        endpoint: String,
        public_base_url: String,
        auth_header: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub enum NotifierConfig {
    Log,
    Pushover {
        base_url: String,
        token: String,
        user: String,
    },
}

/// Everything the pipeline needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProviderConfig,
    pub notion: NotionConfig,
    pub marker: String,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
    pub scratch_dir: Option<PathBuf>,
}

fn required(value: Option<&str>, what: &str) -> anyhow::Result<String> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_owned()),
        _ => anyhow::bail!("missing {what}"),
    }
}

impl ProviderConfig {
    pub fn from_args(args: &ProviderArgs) -> anyhow::Result<Self> {
        if args.http_timeout_secs == 0 {
            anyhow::bail!("--http-timeout-secs must be > 0");
        }
        Ok(Self {
            google_api_key: args
                .google_api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_owned),
            google_books_base_url: args.google_books_base_url.clone(),
            open_library_base_url: args.open_library_base_url.clone(),
            open_library_covers_base_url: args.open_library_covers_base_url.clone(),
            placeholder_cover_url: args.placeholder_cover_url.clone(),
            http_timeout: Duration::from_secs(args.http_timeout_secs),
        })
    }
}

impl Config {
    pub fn from_args(args: &ServiceArgs) -> anyhow::Result<Self> {
        let providers = ProviderConfig::from_args(&args.providers)?;

        let notion = NotionConfig {
            base_url: args.notion_base_url.clone(),
            token: required(args.notion_token.as_deref(), "--notion-token (NOTION_TOKEN)")?,
            database_id: required(
                args.notion_database_id.as_deref(),
                "--notion-database-id (NOTION_DATABASE_ID)",
            )?,
        };

        let marker = args.marker.trim().to_owned();
        if marker.is_empty() {
            anyhow::bail!("--marker must not be empty");
        }

        let public_base_url = || {
            required(
                args.public_base_url.as_deref(),
                "--public-base-url (PUBLIC_BASE_URL)",
            )
        };
        let storage = match args.storage {
            StorageBackend::Local => StorageConfig::LocalDir {
                dir: PathBuf::from(required(
                    args.storage_dir.as_deref(),
                    "--storage-dir (STORAGE_DIR) for local storage",
                )?),
                public_base_url: public_base_url()?,
            },
            StorageBackend::HttpPut => StorageConfig::HttpPut {
                endpoint: required(
                    args.storage_endpoint.as_deref(),
                    "--storage-endpoint (STORAGE_ENDPOINT) for http-put storage",
                )?,
                public_base_url: public_base_url()?,
                auth_header: args
                    .storage_auth_header
                    .as_deref()
                    .filter(|h| !h.trim().is_empty())
                    .map(str::to_owned),
            },
        };

        let notifier = if args.use_pushover {
            NotifierConfig::Pushover {
                base_url: args.pushover_base_url.clone(),
                token: required(
                    args.pushover_token.as_deref(),
                    "--pushover-token (PO_TOKEN) when pushover is enabled",
                )?,
                user: required(
                    args.pushover_user.as_deref(),
                    "--pushover-user (PO_USER) when pushover is enabled",
                )?,
            }
        } else {
            NotifierConfig::Log
        };

        Ok(Self {
            providers,
            notion,
            marker,
            storage,
            notifier,
            scratch_dir: args.scratch_dir.as_deref().map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;
    use crate::cli::{Cli, Command};

    fn service_args(extra: &[&str]) -> ServiceArgs {
        let mut argv = vec![
            "bookshelf-enricher",
            "once",
            "--notion-token",
            "secret",
            "--notion-database-id",
            "db",
            "--storage-dir",
            "/tmp/covers",
            "--public-base-url",
            "https://cdn.example",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Once(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn builds_local_storage_and_log_notifier_by_default() {
        let config = Config::from_args(&service_args(&[])).unwrap();
        assert_eq!(config.marker, "New Book");
        assert!(matches!(config.notifier, NotifierConfig::Log));
        assert!(matches!(
            config.storage,
            StorageConfig::LocalDir { ref public_base_url, .. } if public_base_url == "https://cdn.example"
        ));
        assert_eq!(config.providers.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn pushover_requires_credentials() {
        let err = Config::from_args(&service_args(&["--use-pushover", "yes"]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("PO_TOKEN"), "{err}");

        let config = Config::from_args(&service_args(&[
            "--use-pushover",
            "yes",
            "--pushover-token",
            "t",
            "--pushover-user",
            "u",
        ]))
        .unwrap();
        assert!(matches!(config.notifier, NotifierConfig::Pushover { .. }));
    }

    #[test]
    fn http_put_requires_endpoint() {
        let err = Config::from_args(&service_args(&["--storage", "http-put"]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("--storage-endpoint"), "{err}");
    }

    #[test]
    fn blank_marker_is_rejected() {
        let err = Config::from_args(&service_args(&["--marker", "  "]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("--marker"), "{err}");
    }
}
