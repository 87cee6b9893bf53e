use std::collections::{BTreeMap, BTreeSet};

use cocite_core::Identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

static RIS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9])\s{1,2}-\s?(.*)$").unwrap());

static DOI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+[A-Z0-9/]").unwrap());

const DOI_TAGS: [&str; 2] = ["DO", "DI"];
const FALLBACK_TAGS: [&str; 3] = ["UR", "L1", "N1"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RisEntry {
    pub entry_type: String,
    pub fields: BTreeMap<String, Vec<String>>,
}

impl RisEntry {
    fn new(entry_type: &str) -> Self {
        Self {
            entry_type: entry_type.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn first(&self, tag: &str) -> Option<&str> {
        self.fields
            .get(tag)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, tag: &str) -> impl Iterator<Item = &str> {
        self.fields.get(tag).into_iter().flatten().map(String::as_str)
    }
}

/// What [`extract_dois_from_ris`] saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RisStats {
    pub records: usize,
    /// Records whose DOI came from a `DO`/`DI` tag.
    pub from_doi_tag: usize,
    /// Records whose DOI was found in `UR`, `L1` or `N1`.
    pub from_fallback: usize,
    pub without_doi: usize,
}

/// Lenient RIS reader. Unknown lines continue the previous field, a missing
/// final `ER` still closes the record, and a leading BOM is ignored.
pub fn parse_ris(content: &str) -> Vec<RisEntry> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut entries = Vec::new();
    let mut current: Option<RisEntry> = None;
    let mut last_tag: Option<String> = None;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "ER" || line.starts_with("ER ") {
            entries.extend(current.take());
            last_tag = None;
            continue;
        }

        let Some(caps) = RIS_LINE.captures(line) else {
            // continuation of a multi-line field
            if let (Some(entry), Some(tag)) = (current.as_mut(), last_tag.as_deref())
                && let Some(value) = entry.fields.get_mut(tag).and_then(|v| v.last_mut())
            {
                value.push(' ');
                value.push_str(line);
            }
            continue;
        };
        let tag = &caps[1];
        let value = caps[2].trim();

        if tag == "TY" {
            entries.extend(current.take());
            current = Some(RisEntry::new(value));
            last_tag = None;
            continue;
        }
        if value.is_empty() {
            continue;
        }

        let entry = current.get_or_insert_with(|| RisEntry::new(""));
        entry
            .fields
            .entry(tag.to_string())
            .or_default()
            .push(value.to_string());
        last_tag = Some(tag.to_string());
    }
    entries.extend(current);
    entries
}

/// Normalized DOIs of every record in a RIS file.
pub fn extract_dois_from_ris(content: &str) -> (BTreeSet<Identifier>, RisStats) {
    let entries = parse_ris(content);
    let mut stats = RisStats {
        records: entries.len(),
        ..RisStats::default()
    };
    let mut dois = BTreeSet::new();

    for entry in &entries {
        if let Some(doi) = doi_from_tags(entry) {
            stats.from_doi_tag += 1;
            dois.insert(doi);
        } else if let Some(doi) = doi_from_links(entry) {
            stats.from_fallback += 1;
            dois.insert(doi);
        } else {
            stats.without_doi += 1;
            debug!(title = entry.first("TI").unwrap_or("untitled"), "RIS record without DOI");
        }
    }

    info!(
        records = stats.records,
        unique_dois = dois.len(),
        without_doi = stats.without_doi,
        "extracted DOIs from RIS"
    );
    (dois, stats)
}

fn doi_from_tags(entry: &RisEntry) -> Option<Identifier> {
    DOI_TAGS
        .iter()
        .flat_map(|tag| entry.all(tag))
        .find_map(|value| Identifier::parse_opt(value).filter(Identifier::is_doi))
}

fn doi_from_links(entry: &RisEntry) -> Option<Identifier> {
    FALLBACK_TAGS
        .iter()
        .flat_map(|tag| entry.all(tag))
        .flat_map(|value| DOI_REGEX.find_iter(value))
        .find_map(|m| Identifier::parse_opt(m.as_str().trim_end_matches(['.', ',', ';'])))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\u{feff}TY  - JOUR
TI  - Attention is all
you need
DO  - https://doi.org/10.48550/ARXIV.1706.03762
ER  -

TY  - JOUR
TI  - Linked only
UR  - https://journals.example.org/doi/full/10.1234/ABC.5678.
ER  -

TY  - BOOK
TI  - Nothing here
N1  - see chapter 3
ER  -
TY  - JOUR
DO  - 10.1234/abc.5678
";

    #[test]
    fn parses_records_and_continuations() {
        let entries = parse_ris(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].entry_type, "JOUR");
        assert_eq!(entries[0].first("TI"), Some("Attention is all you need"));
        assert_eq!(entries[2].entry_type, "BOOK");
        // last record has no ER
        assert_eq!(entries[3].first("DO"), Some("10.1234/abc.5678"));
    }

    #[test]
    fn extracts_normalized_unique_dois() {
        let (dois, stats) = extract_dois_from_ris(SAMPLE);
        let found: Vec<&str> = dois.iter().map(Identifier::as_str).collect();
        assert_eq!(found, vec!["10.1234/abc.5678", "10.48550/arxiv.1706.03762"]);
        assert_eq!(
            stats,
            RisStats {
                records: 4,
                from_doi_tag: 2,
                from_fallback: 1,
                without_doi: 1,
            }
        );
    }

    #[test]
    fn invalid_doi_tag_falls_back_to_links() {
        let ris = "TY  - JOUR\nDO  - not a doi\nL1  - file:///papers/10.5555/xyz-1.pdf\nER  -\n";
        let (dois, stats) = extract_dois_from_ris(ris);
        assert_eq!(stats.from_fallback, 1);
        assert!(dois.contains(&Identifier::parse("10.5555/xyz-1.pdf").unwrap()));
    }

    #[test]
    fn empty_input() {
        let (dois, stats) = extract_dois_from_ris("");
        assert!(dois.is_empty());
        assert_eq!(stats, RisStats::default());
    }
}
