use serde_json::{Value, json};

use crate::banner::BannerAsset;
use crate::book::CanonicalBook;
use crate::error::PipelineError;
use crate::isbn::Isbn;
use crate::store::DocumentStore;

pub const BOOK_TYPE: &str = "Physical";
pub const UNTITLED: &str = "Untitled";

/// Removes every case-insensitive occurrence of `marker` so the written
/// title can never match the pending filter again. Whitespace is collapsed
/// before each search, so a removal cannot splice a new occurrence together.
pub fn strip_marker(title: &str, marker: &str) -> String {
    let marker = collapse_whitespace(marker);
    if marker.is_empty() {
        return title.trim().to_owned();
    }

    let needle = marker.to_lowercase();
    if find_case_insensitive(title, &needle).is_none() {
        return title.trim().to_owned();
    }

    let mut out = collapse_whitespace(title);
    while let Some(start) = find_case_insensitive(&out, &needle) {
        let end = start + marker_len_at(&out, start, needle.chars().count());
        out.replace_range(start..end, "");
        out = collapse_whitespace(&out);
    }

    let trimmed = out.trim_matches(|c: char| c == ':' || c == '-' || c.is_whitespace());
    if trimmed.is_empty() {
        return UNTITLED.to_owned();
    }
    trimmed.to_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_case_insensitive(haystack: &str, needle_lower: &str) -> Option<usize> {
    let needle_chars = needle_lower.chars().count();
    haystack.char_indices().map(|(idx, _)| idx).find(|&idx| {
        let candidate = haystack[idx..]
            .chars()
            .take(needle_chars)
            .collect::<String>()
            .to_lowercase();
        candidate == needle_lower
    })
}

fn marker_len_at(haystack: &str, start: usize, chars: usize) -> usize {
    haystack[start..]
        .chars()
        .take(chars)
        .map(char::len_utf8)
        .sum()
}

/// Maps the canonical record and asset URLs onto the Notion page schema.
pub fn build_patch(
    isbn: &Isbn,
    book: &CanonicalBook,
    asset: &BannerAsset,
    marker: &str,
) -> Value {
    let title = strip_marker(&book.title, marker);
    json!({
        "cover": { "external": { "url": asset.banner_url } },
        "properties": {
            "Author": { "select": { "name": book.author_line() } },
            "Publisher": { "select": { "name": book.publisher } },
            "ISBN": { "rich_text": [{ "text": { "content": isbn.as_str() } }] },
            "Summary": { "rich_text": [{ "text": { "content": book.description.as_deref().unwrap_or_default() } }] },
            "Type": { "select": { "name": BOOK_TYPE } },
            "Cover": { "files": [{ "name": title, "external": { "url": asset.cover_url } }] },
            "Year": { "number": book.year },
            "Pages": { "number": book.page_count },
            "Name": { "title": [{ "text": { "content": title } }] },
        },
    })
}

pub struct RecordUpdater<'a> {
    store: &'a dyn DocumentStore,
    marker: &'a str,
}

impl<'a> RecordUpdater<'a> {
    pub fn new(store: &'a dyn DocumentStore, marker: &'a str) -> Self {
        Self { store, marker }
    }

    /// Single write, never retried.
    pub fn apply(
        &self,
        record_id: &str,
        isbn: &Isbn,
        book: &CanonicalBook,
        asset: &BannerAsset,
    ) -> Result<(), PipelineError> {
        let patch = build_patch(isbn, book, asset, self.marker);
        self.store.patch(record_id, &patch).map_err(|err| {
            tracing::error!(record_id, status = err.status, code = %err.code, message = %err.message, "update rejected");
            PipelineError::WriteFailure {
                status: err.status,
                code: err.code,
                message: err.message,
            }
        })?;
        tracing::info!(record_id, title = %book.title, "book details updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::RawBook;

    fn odyssey() -> CanonicalBook {
        CanonicalBook::normalize(RawBook {
            title: Some("The Odyssey".to_owned()),
            authors: vec!["Homer".to_owned()],
            published_date: Some("2003".to_owned()),
            page_count: Some(541),
            ..RawBook::default()
        })
        .unwrap()
    }

    fn asset() -> BannerAsset {
        BannerAsset {
            cover_url: "https://cdn.example/book_covers/p.jpg".to_owned(),
            banner_url: "https://cdn.example/book_banners/p.jpg".to_owned(),
        }
    }

    #[test]
    fn patch_maps_every_field() {
        let isbn = Isbn::parse("9780140449266").unwrap();
        let patch = build_patch(&isbn, &odyssey(), &asset(), "New Book");

        assert_eq!(
            patch.pointer("/cover/external/url").and_then(Value::as_str),
            Some("https://cdn.example/book_banners/p.jpg")
        );
        let props = &patch["properties"];
        assert_eq!(props["Author"]["select"]["name"], "Homer");
        assert_eq!(props["Publisher"]["select"]["name"], "No Publisher Found");
        assert_eq!(props["ISBN"]["rich_text"][0]["text"]["content"], "9780140449266");
        assert_eq!(props["Summary"]["rich_text"][0]["text"]["content"], "");
        assert_eq!(props["Type"]["select"]["name"], "Physical");
        assert_eq!(props["Cover"]["files"][0]["name"], "The Odyssey");
        assert_eq!(
            props["Cover"]["files"][0]["external"]["url"],
            "https://cdn.example/book_covers/p.jpg"
        );
        assert_eq!(props["Year"]["number"], 2003);
        assert_eq!(props["Pages"]["number"], 541);
        assert_eq!(props["Name"]["title"][0]["text"]["content"], "The Odyssey");
    }

    #[test]
    fn missing_year_is_null() {
        let mut book = odyssey();
        book.year = None;
        let isbn = Isbn::parse("1").unwrap();
        let patch = build_patch(&isbn, &book, &asset(), "New Book");
        assert!(patch["properties"]["Year"]["number"].is_null());
    }

    #[test]
    fn strip_marker_removes_case_insensitive_occurrences() {
        assert_eq!(strip_marker("The New Book of Verse", "New Book"), "The of Verse");
        assert_eq!(strip_marker("a NEW BOOK b new book", "New Book"), "a b");
        assert_eq!(strip_marker("New Book", "New Book"), UNTITLED);
        assert_eq!(strip_marker("Foo  Baz: Qux", "New Book"), "Foo  Baz: Qux");
        assert_eq!(strip_marker("Café New Book", "new book"), "Café");
        assert_eq!(strip_marker("New Book: A Memoir", "New Book"), "A Memoir");
    }

    #[test]
    fn strip_marker_never_splices_a_new_occurrence() {
        let title = crate::book::normalize_title("New Book: New (Revised) Book", None);
        assert_eq!(title, "New Book: New  Book");

        let written = strip_marker(&title, "New Book");
        assert!(!written.to_lowercase().contains("new book"), "{written}");
        assert_eq!(written, UNTITLED);

        let written = strip_marker("New New Book Book Club", "New Book");
        assert!(!written.to_lowercase().contains("new book"), "{written}");
        assert_eq!(written, "Club");
    }
}
