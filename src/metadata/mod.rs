//! Ordered bibliographic lookups. The first provider that yields a usable
//! record wins; nothing is merged across providers.

pub mod google_books;
pub mod open_library;

use crate::book::{CanonicalBook, RawBook};
use crate::error::PipelineError;
use crate::isbn::Isbn;

pub use google_books::GoogleBooks;
pub use open_library::OpenLibraryBooks;

pub trait MetadataProvider {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the provider answered but had no match.
    fn lookup(&self, isbn: &Isbn) -> Result<Option<RawBook>, PipelineError>;
}

pub struct MetadataChain {
    providers: Vec<Box<dyn MetadataProvider>>,
}

impl MetadataChain {
    pub fn new(providers: Vec<Box<dyn MetadataProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn resolve(&self, isbn: &Isbn) -> Result<CanonicalBook, PipelineError> {
        for provider in &self.providers {
            let raw = match provider.lookup(isbn) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    tracing::info!(provider = provider.name(), %isbn, "no match");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(provider = provider.name(), %isbn, %err, "lookup failed; trying next provider");
                    continue;
                }
            };

            match CanonicalBook::normalize(raw) {
                Some(book) => {
                    tracing::info!(provider = provider.name(), %isbn, title = %book.title, "found book");
                    return Ok(book);
                }
                None => {
                    tracing::info!(provider = provider.name(), %isbn, "match without a title; trying next provider");
                }
            }
        }

        Err(PipelineError::NotFound {
            isbn: isbn.to_string(),
        })
    }
}
