//! Per-record orchestration and the batch entry point.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use serde::Serialize;

use crate::banner::{BannerAsset, BannerSynthesizer};
use crate::config::{Config, NotifierConfig, ProviderConfig, StorageConfig};
use crate::cover::{CoverResolver, EmbeddedCover, OpenLibraryCoverApi, OpenLibraryPageScrape};
use crate::error::PipelineError;
use crate::http;
use crate::isbn::Isbn;
use crate::metadata::{GoogleBooks, MetadataChain, OpenLibraryBooks};
use crate::notify::{LogNotifier, Notifier, PushoverNotifier};
use crate::storage::{HttpPutStorage, LocalDirStorage, ObjectStorage};
use crate::store::{DocumentStore, NotionStore, PendingRecord};
use crate::updater::RecordUpdater;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    ResolvingMetadata,
    ResolvingCover,
    SynthesizingBanner,
    Updating,
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::ResolvingMetadata => "resolving(metadata)",
            Self::ResolvingCover => "resolving(cover)",
            Self::SynthesizingBanner => "synthesizing(banner)",
            Self::Updating => "updating",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum RecordOutcome {
    Done { title: String, asset: BannerAsset },
    Skipped(PipelineError),
    Failed(PipelineError),
}

impl RecordOutcome {
    pub fn state(&self) -> RecordState {
        match self {
            Self::Done { .. } => RecordState::Done,
            Self::Skipped(_) => RecordState::Skipped,
            Self::Failed(_) => RecordState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &RecordOutcome) {
        self.processed += 1;
        match outcome.state() {
            RecordState::Done => self.succeeded += 1,
            RecordState::Skipped => self.skipped += 1,
            _ => self.failed += 1,
        }
    }
}

pub fn build_metadata_chain(
    config: &ProviderConfig,
    client: &reqwest::blocking::Client,
) -> MetadataChain {
    MetadataChain::new(vec![
        Box::new(GoogleBooks::new(
            client.clone(),
            config.google_books_base_url.clone(),
            config.google_api_key.clone(),
        )),
        Box::new(OpenLibraryBooks::new(
            client.clone(),
            config.open_library_base_url.clone(),
            config.open_library_covers_base_url.clone(),
        )),
    ])
}

pub fn build_cover_resolver(
    config: &ProviderConfig,
    client: &reqwest::blocking::Client,
) -> CoverResolver {
    CoverResolver::new(
        vec![
            Box::new(EmbeddedCover),
            Box::new(OpenLibraryCoverApi::new(
                client.clone(),
                config.open_library_base_url.clone(),
                config.open_library_covers_base_url.clone(),
            )),
            Box::new(OpenLibraryPageScrape::new(
                client.clone(),
                config.open_library_base_url.clone(),
            )),
        ],
        config.placeholder_cover_url.clone(),
    )
}

pub struct Pipeline {
    metadata: MetadataChain,
    covers: CoverResolver,
    synthesizer: BannerSynthesizer,
    store: Box<dyn DocumentStore>,
    storage: Box<dyn ObjectStorage>,
    notifier: Box<dyn Notifier>,
    marker: String,
}

impl Pipeline {
    pub fn new(
        metadata: MetadataChain,
        covers: CoverResolver,
        synthesizer: BannerSynthesizer,
        store: Box<dyn DocumentStore>,
        storage: Box<dyn ObjectStorage>,
        notifier: Box<dyn Notifier>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            covers,
            synthesizer,
            store,
            storage,
            notifier,
            marker: marker.into(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = http::build_client(config.providers.http_timeout)?;

        let store = NotionStore::new(
            client.clone(),
            config.notion.base_url.clone(),
            config.notion.token.clone(),
            config.notion.database_id.clone(),
        );

        let storage: Box<dyn ObjectStorage> = match &config.storage {
            StorageConfig::LocalDir {
                dir,
                public_base_url,
            } => Box::new(LocalDirStorage::new(dir.clone(), public_base_url.clone())),
            StorageConfig::HttpPut {
                endpoint,
                public_base_url,
                auth_header,
            } => Box::new(HttpPutStorage::new(
                client.clone(),
                endpoint.clone(),
                public_base_url.clone(),
                auth_header.clone(),
            )),
        };

        let notifier: Box<dyn Notifier> = match &config.notifier {
            NotifierConfig::Log => Box::new(LogNotifier),
            NotifierConfig::Pushover {
                base_url,
                token,
                user,
            } => Box::new(PushoverNotifier::new(
                client.clone(),
                base_url.clone(),
                token.clone(),
                user.clone(),
            )),
        };

        if let Some(dir) = config.scratch_dir.as_deref() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create scratch dir: {}", dir.display()))?;
        }
        let synthesizer = BannerSynthesizer::new(
            client.clone(),
            config.providers.placeholder_cover_url.clone(),
            config.scratch_dir.clone(),
        );

        Ok(Self::new(
            build_metadata_chain(&config.providers, &client),
            build_cover_resolver(&config.providers, &client),
            synthesizer,
            Box::new(store),
            storage,
            notifier,
            config.marker.clone(),
        ))
    }

    /// One tick: list pending records and run each to a terminal state, in
    /// order. Only a failure to list the batch is returned as an error.
    pub fn process_batch(&self) -> anyhow::Result<BatchReport> {
        tracing::info!(marker = %self.marker, "looking for new books");
        let records = self
            .store
            .list_pending(&self.marker)
            .context("list pending records")?;

        let mut report = BatchReport::default();
        for record in &records {
            let outcome = self.process_record(record);
            report.record(&outcome);
        }

        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }

    pub fn process_record(&self, record: &PendingRecord) -> RecordOutcome {
        let record_id = record.id.as_str();
        enter(record_id, RecordState::Pending);

        let isbn = match parse_record(record) {
            Ok(isbn) => isbn,
            Err(err) => return self.finish(record_id, RecordOutcome::Skipped(err)),
        };

        enter(record_id, RecordState::ResolvingMetadata);
        let book = match self.metadata.resolve(&isbn) {
            Ok(book) => book,
            Err(err) => return self.finish(record_id, RecordOutcome::Skipped(err)),
        };

        enter(record_id, RecordState::ResolvingCover);
        let cover_url = self.covers.resolve(&isbn, &book);

        enter(record_id, RecordState::SynthesizingBanner);
        let banner = match self
            .synthesizer
            .synthesize(&cover_url, record_id, self.storage.as_ref())
        {
            Ok(banner) => banner,
            Err(err) => return self.finish(record_id, RecordOutcome::Failed(err)),
        };

        enter(record_id, RecordState::Updating);
        let updater = RecordUpdater::new(self.store.as_ref(), &self.marker);
        let written = updater.apply(record_id, &isbn, &book, &banner.asset);
        let asset = banner.asset.clone();
        drop(banner);

        match written {
            Ok(()) => self.finish(
                record_id,
                RecordOutcome::Done {
                    title: book.title,
                    asset,
                },
            ),
            Err(err) => self.finish(record_id, RecordOutcome::Failed(err)),
        }
    }

    fn finish(&self, record_id: &str, outcome: RecordOutcome) -> RecordOutcome {
        enter(record_id, outcome.state());
        match &outcome {
            RecordOutcome::Done { title, .. } => {
                tracing::info!(record_id, %title, "record done");
                self.notifier.notify(
                    "New book found!!!",
                    &format!("Adding {title} to your book collection"),
                );
            }
            RecordOutcome::Skipped(err) => {
                tracing::warn!(record_id, %err, "record skipped");
                self.notifier.notify(&err.subject(), &err.message());
            }
            RecordOutcome::Failed(err) => {
                tracing::error!(record_id, %err, "record failed");
                self.notifier.notify(&err.subject(), &err.message());
            }
        }
        outcome
    }
}

fn enter(record_id: &str, state: RecordState) {
    tracing::debug!(record_id, %state, "record state");
}

fn parse_record(record: &PendingRecord) -> Result<Isbn, PipelineError> {
    let malformed = |reason: &str| PipelineError::MalformedRecord {
        record_id: record.id.clone(),
        reason: reason.to_owned(),
    };

    if record.title().is_none() {
        return Err(malformed("missing title"));
    }
    record
        .isbn_text()
        .as_deref()
        .and_then(Isbn::parse)
        .ok_or_else(|| malformed("missing ISBN"))
}

/// Runs ticks back to back at `interval`. A tick that overruns the interval
/// delays the next one; ticks never overlap.
pub fn run_loop(
    pipeline: &Pipeline,
    interval: Duration,
    max_ticks: Option<u64>,
) -> anyhow::Result<()> {
    let mut tick = 0_u64;
    loop {
        let started = Instant::now();
        tick += 1;
        pipeline
            .process_batch()
            .with_context(|| format!("tick {tick}"))?;

        if max_ticks.is_some_and(|max| tick >= max) {
            return Ok(());
        }

        let elapsed = started.elapsed();
        match interval.checked_sub(elapsed) {
            Some(wait) => {
                tracing::info!(next_in_secs = wait.as_secs(), "next scan scheduled");
                std::thread::sleep(wait);
            }
            None => {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tick overran interval; starting next immediately"
                );
            }
        }
    }
}
