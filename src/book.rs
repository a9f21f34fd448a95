use std::sync::OnceLock;

use chrono::{Datelike as _, NaiveDate};
use regex::Regex;
use serde::Serialize;

pub const DEFAULT_AUTHOR: &str = "Anthology";
pub const DEFAULT_PUBLISHER: &str = "No Publisher Found";
pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
const ELLIPSIS: &str = "...";

/// Flat fields a provider adapter extracts from its own response schema.
///
/// Adapters fill this in; [`CanonicalBook::normalize`] is the only way to
/// turn it into the record the rest of the pipeline sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBook {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub page_count: Option<u32>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalBook {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub publisher: String,
    pub page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl CanonicalBook {
    /// Returns `None` when the provider gave no usable title.
    pub fn normalize(raw: RawBook) -> Option<Self> {
        let base_title = non_empty(raw.title)?;
        let subtitle = non_empty(raw.subtitle);
        let title = normalize_title(&base_title, subtitle.as_deref());
        if title.is_empty() {
            return None;
        }

        let authors = normalize_authors(raw.authors);
        let published_date = non_empty(raw.published_date);
        let year = published_date.as_deref().and_then(parse_year);
        let description = raw
            .description
            .as_deref()
            .map(normalize_description)
            .filter(|d| !d.is_empty());
        let publisher = normalize_publisher(raw.publisher.as_deref());

        Some(Self {
            title,
            subtitle,
            authors,
            published_date,
            year,
            description,
            publisher,
            page_count: raw.page_count.unwrap_or(0),
            cover_url: non_empty(raw.cover_url),
        })
    }

    pub fn author_line(&self) -> String {
        self.authors.join(" & ")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parenthetical_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)").expect("valid parenthetical regex"))
}

fn html_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid html tag regex"))
}

fn markdown_escape_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\([[:punct:]])").expect("valid markdown escape regex"))
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})\b").expect("valid year regex"))
}

/// Appends the subtitle, then strips every parenthetical (subtitle included)
/// and any colon left dangling, then truncates to [`MAX_TITLE_CHARS`] characters.
pub fn normalize_title(title: &str, subtitle: Option<&str>) -> String {
    let combined = match subtitle {
        Some(subtitle) => format!("{title}: {subtitle}"),
        None => title.to_owned(),
    };
    let stripped = parenthetical_regex().replace_all(&combined, "");
    stripped
        .trim()
        .trim_end_matches(':')
        .trim_end()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect::<String>()
        .trim_end()
        .to_owned()
}

pub fn normalize_authors(authors: Vec<String>) -> Vec<String> {
    let authors = authors
        .into_iter()
        .map(|a| a.trim().to_owned())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>();
    if authors.is_empty() {
        return vec![DEFAULT_AUTHOR.to_owned()];
    }
    authors
}

pub fn normalize_publisher(publisher: Option<&str>) -> String {
    let cleaned = publisher
        .unwrap_or_default()
        .replace([',', ';'], "")
        .trim()
        .to_owned();
    if cleaned.is_empty() {
        return DEFAULT_PUBLISHER.to_owned();
    }
    cleaned
}

/// Drops tags, then lets html2md decode named and numeric entities. Its
/// markdown escapes are undone so the result stays plain text.
pub fn strip_html(input: &str) -> String {
    let text = html_tag_regex().replace_all(input, "");
    if !text.contains('&') {
        return text.into_owned();
    }
    let decoded = html2md::parse_html(&text);
    markdown_escape_regex()
        .replace_all(&decoded, "$1")
        .into_owned()
}

/// HTML-strips, drops double quotes and line breaks, collapses whitespace and
/// shortens to [`MAX_DESCRIPTION_CHARS`] on a word boundary.
pub fn normalize_description(input: &str) -> String {
    let text = strip_html(input).replace(['"', '\n', '\r'], "");
    shorten(&text, MAX_DESCRIPTION_CHARS)
}

fn shorten(text: &str, width: usize) -> String {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let collapsed = words.join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(ELLIPSIS.len());
    let mut out = String::new();
    let mut used = 0_usize;
    for word in words {
        let word_len = word.chars().count();
        let needed = if out.is_empty() { word_len } else { word_len + 1 };
        if used + needed > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += needed;
    }
    out.push_str(ELLIPSIS);
    out
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// Loose year extraction: full dates first, then the first standalone
/// four-digit run (`"2003"`, `"2003-05"`, `"c. 2003"`).
pub fn parse_year(date: &str) -> Option<i32> {
    let date = date.trim();
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(date, format) {
            return Some(parsed.year());
        }
    }
    year_regex()
        .captures(date)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .filter(|year| (1000..=2999).contains(year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str) -> RawBook {
        RawBook {
            title: Some(title.to_owned()),
            ..RawBook::default()
        }
    }

    #[test]
    fn title_parentheticals_are_removed_after_subtitle_append() {
        assert_eq!(normalize_title("Foo (Bar) Baz", Some("Qux")), "Foo  Baz: Qux");
        assert_eq!(
            normalize_title("Dune", Some("Deluxe (40th Anniversary)")),
            "Dune: Deluxe"
        );
        assert_eq!(
            normalize_title("The Odyssey", Some("(Penguin Classics)")),
            "The Odyssey"
        );
    }

    #[test]
    fn title_is_truncated_to_one_hundred_chars() {
        let long = "x".repeat(150);
        let title = normalize_title(&long, Some("sub"));
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn normalize_requires_a_title() {
        assert!(CanonicalBook::normalize(RawBook::default()).is_none());
        assert!(CanonicalBook::normalize(raw("   ")).is_none());
        assert!(CanonicalBook::normalize(raw("(Only a parenthetical)")).is_none());
    }

    #[test]
    fn normalize_applies_defaults() {
        let book = CanonicalBook::normalize(raw("The Odyssey")).unwrap();
        assert_eq!(book.authors, vec!["Anthology".to_owned()]);
        assert_eq!(book.publisher, "No Publisher Found");
        assert_eq!(book.page_count, 0);
        assert_eq!(book.year, None);
        assert_eq!(book.description, None);
        assert_eq!(book.cover_url, None);
    }

    #[test]
    fn publisher_separators_are_stripped() {
        assert_eq!(
            normalize_publisher(Some("Penguin, Random House; Ltd")),
            "Penguin Random House Ltd"
        );
        assert_eq!(normalize_publisher(Some(",;")), DEFAULT_PUBLISHER);
    }

    #[test]
    fn description_is_stripped_and_sanitized() {
        let input = "<p>An \"epic\" poem.</p>\n<b>Homer</b> and friends";
        assert_eq!(normalize_description(input), "An epic poem.Homer and friends");

        let out = normalize_description("<p>Gods &amp; <i>monsters</i> &lt;3</p>");
        assert_eq!(out, "Gods & monsters <3");
    }

    #[test]
    fn description_decodes_numeric_and_named_entities() {
        let out = normalize_description(
            "<p>Homer&#8217;s epic &#x2014; translated by Fagles&hellip;</p>",
        );
        assert!(!out.contains('&'), "{out}");
        assert_eq!(out, "Homer\u{2019}s epic \u{2014} translated by Fagles\u{2026}");

        let out = strip_html("a_b *c* &mdash; 5 \\ 6");
        assert_eq!(out.split_whitespace().collect::<Vec<_>>().join(" "), "a_b *c* \u{2014} 5 \\ 6");
    }

    #[test]
    fn description_is_shortened_on_word_boundary() {
        let input = "word ".repeat(1000);
        let out = normalize_description(&input);
        assert!(out.chars().count() <= MAX_DESCRIPTION_CHARS);
        assert!(out.ends_with("word..."));
    }

    #[test]
    fn parse_year_handles_loose_dates() {
        assert_eq!(parse_year("2003"), Some(2003));
        assert_eq!(parse_year("2003-05-01"), Some(2003));
        assert_eq!(parse_year("May 5, 1999"), Some(1999));
        assert_eq!(parse_year("1999-07"), Some(1999));
        assert_eq!(parse_year("c. 1850"), Some(1850));
        assert_eq!(parse_year("unknown"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn author_line_joins_with_ampersand() {
        let book = CanonicalBook::normalize(RawBook {
            authors: vec!["Homer".to_owned(), " Emily Wilson ".to_owned()],
            ..raw("The Odyssey")
        })
        .unwrap();
        assert_eq!(book.author_line(), "Homer & Emily Wilson");
    }
}
