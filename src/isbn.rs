use std::fmt;

use serde::Serialize;

/// Raw book identifier as typed into the document store.
///
/// No checksum validation happens here; providers get the token verbatim
/// (minus surrounding whitespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Isbn;

    #[test]
    fn parse_trims_and_keeps_token_verbatim() {
        let isbn = Isbn::parse("  978-0-14-044926-6 \n").unwrap();
        assert_eq!(isbn.as_str(), "978-0-14-044926-6");
    }

    #[test]
    fn parse_rejects_blank() {
        assert!(Isbn::parse("").is_none());
        assert!(Isbn::parse("   ").is_none());
    }
}
