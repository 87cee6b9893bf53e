use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CocitationError, Result};

/// Matched case-insensitively.
const DOI_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

fn strip_prefix_ignore_case<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    input
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &input[prefix.len()..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Doi,
    /// All-digit graph id (Microsoft Academic Graph numbering).
    Numeric,
}

/// Normalized paper identifier: a lowercase DOI or an all-digit graph id.
///
/// Two identifiers are equal iff their normalized strings are equal. The
/// ordering is lexicographic on that string, which node numbering relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Self(input.to_string()));
        }

        let mut stripped = input;
        for prefix in DOI_PREFIXES {
            if let Some(rest) = strip_prefix_ignore_case(stripped, prefix) {
                stripped = rest.trim_start();
                break;
            }
        }

        if !stripped.starts_with("10.") {
            return Err(CocitationError::InvalidIdentifier(input.to_string()));
        }
        let slash_pos = stripped
            .find('/')
            .ok_or_else(|| CocitationError::InvalidIdentifier(input.to_string()))?;
        if stripped[slash_pos + 1..].is_empty() {
            return Err(CocitationError::InvalidIdentifier(input.to_string()));
        }

        Ok(Self(stripped.to_lowercase()))
    }

    /// Lenient variant for provider payloads, where junk entries are skipped.
    pub fn parse_opt(input: &str) -> Option<Self> {
        Self::parse(input).ok()
    }

    pub fn kind(&self) -> IdentifierKind {
        if self.0.starts_with("10.") {
            IdentifierKind::Doi
        } else {
            IdentifierKind::Numeric
        }
    }

    pub fn is_doi(&self) -> bool {
        self.kind() == IdentifierKind::Doi
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn doi_url(&self) -> Option<String> {
        self.is_doi().then(|| format!("https://doi.org/{}", self.0))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = CocitationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Identifier::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Which half of a paper's citation neighbourhood is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    References,
    Citations,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::References => "references",
            Self::Citations => "citations",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_doi() {
        let id = Identifier::parse("10.1000/xyz123").unwrap();
        assert_eq!(id.as_str(), "10.1000/xyz123");
        assert_eq!(id.kind(), IdentifierKind::Doi);
        assert_eq!(id.doi_url().as_deref(), Some("https://doi.org/10.1000/xyz123"));
    }

    #[test]
    fn doi_prefixes_are_stripped() {
        for raw in [
            "https://doi.org/10.1000/xyz123",
            "http://dx.doi.org/10.1000/xyz123",
            "doi:10.1000/xyz123",
            "DOI: 10.1000/xyz123",
        ] {
            assert_eq!(Identifier::parse(raw).unwrap().as_str(), "10.1000/xyz123");
        }
    }

    #[test]
    fn doi_prefixes_ignore_case() {
        for raw in [
            "HTTPS://DOI.ORG/10.1/X",
            "Http://Dx.Doi.Org/10.1/x",
            "Doi:10.1/x",
        ] {
            assert_eq!(Identifier::parse(raw).unwrap().as_str(), "10.1/x");
        }
        // multi-byte input shorter than a prefix
        assert!(Identifier::parse("dö").is_err());
    }

    #[test]
    fn doi_uppercase_normalized_to_lowercase() {
        let a = Identifier::parse("10.1000/XYZ123").unwrap();
        let b = Identifier::parse("10.1000/xyz123").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_graph_id() {
        let id = Identifier::parse(" 2741809807 ").unwrap();
        assert_eq!(id.as_str(), "2741809807");
        assert_eq!(id.kind(), IdentifierKind::Numeric);
        assert!(id.doi_url().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Identifier::parse("").is_err());
        assert!(Identifier::parse("not-a-doi").is_err());
        assert!(Identifier::parse("10.1000").is_err());
        assert!(Identifier::parse("10.1000/").is_err());
        assert!(Identifier::parse("12a34").is_err());
    }

    #[test]
    fn deserialize_normalizes() {
        let id: Identifier = serde_json::from_str("\"https://doi.org/10.1/ABC\"").unwrap();
        assert_eq!(id.as_str(), "10.1/abc");
        assert!(serde_json::from_str::<Identifier>("\"nope\"").is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut ids = vec![
            Identifier::parse("10.2/b").unwrap(),
            Identifier::parse("10.1/z").unwrap(),
            Identifier::parse("123").unwrap(),
        ];
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(Identifier::as_str).collect();
        assert_eq!(sorted, vec!["10.1/z", "10.2/b", "123"]);
    }
}
