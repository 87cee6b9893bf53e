use cocite_core::Identifier;
use unicode_normalization::UnicodeNormalization;

use crate::sources::WorkMetadata;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_SOURCE: &str = "Unknown Source";
pub const UNKNOWN_LABEL: &str = "Unknown (unknown)";

const MAX_LISTED_AUTHORS: usize = 4;

/// Display fields for one network node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDetails {
    pub label: String,
    pub description: String,
    pub url: String,
    pub year: Option<i32>,
    pub citations: Option<u32>,
}

impl NodeDetails {
    /// Fields for a node whose metadata could not be fetched.
    pub fn placeholder(id: &Identifier) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            description: description_table("Unknown", UNKNOWN_TITLE, UNKNOWN_SOURCE, None),
            url: id.doi_url().unwrap_or_default(),
            year: None,
            citations: None,
        }
    }

    pub fn from_metadata(id: &Identifier, meta: &WorkMetadata) -> Self {
        let authors = author_list(&meta.authors);
        Self {
            label: label(&meta.authors, meta.year),
            description: description_table(
                if authors.is_empty() { "Unknown" } else { &authors },
                meta.title.as_deref().filter(|t| !t.is_empty()).unwrap_or(UNKNOWN_TITLE),
                meta.venue.as_deref().filter(|v| !v.is_empty()).unwrap_or(UNKNOWN_SOURCE),
                meta.year,
            ),
            url: meta
                .canonical_url
                .clone()
                .or_else(|| id.doi_url())
                .unwrap_or_default(),
            year: meta.year,
            citations: meta.cited_by_count,
        }
    }
}

/// `"Surname (year)"` from the first author, e.g. `"Muller (2019)"`.
pub fn label(authors: &[String], year: Option<i32>) -> String {
    let surname = authors
        .iter()
        .find_map(|name| name.split_whitespace().last())
        .map(capitalize)
        .map(|s| {
            let folded = fold_ascii(&s);
            if folded.is_empty() { s } else { folded }
        })
        .unwrap_or_else(|| "Unknown".to_string());
    match year {
        Some(y) => format!("{surname} ({y})"),
        None => format!("{surname} (unknown)"),
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Strip diacritics and drop whatever has no ASCII form.
pub fn fold_ascii(s: &str) -> String {
    s.nfkd().filter(char::is_ascii).collect()
}

fn author_list(authors: &[String]) -> String {
    let mut listed = authors
        .iter()
        .take(MAX_LISTED_AUTHORS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ");
    if authors.len() > MAX_LISTED_AUTHORS {
        listed.push_str(&format!(" (and {} others)", authors.len() - MAX_LISTED_AUTHORS));
    }
    listed
}

fn description_table(authors: &str, title: &str, source: &str, year: Option<i32>) -> String {
    let year = year.map_or_else(|| "Unknown".to_string(), |y| y.to_string());
    format!(
        "<table>\
         <tr><td>Authors:</td><td>{}</td></tr>\
         <tr><td>Title:</td><td>{}</td></tr>\
         <tr><td>Source:</td><td>{}</td></tr>\
         <tr><td>Year:</td><td>{}</td></tr>\
         </table>",
        escape_html(authors),
        escape_html(title),
        escape_html(source),
        year
    )
}

/// Escape `&`, `<` and `>`. Quotes are left alone.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Citations per year since publication, two decimals. Papers from this
/// year (or a future one) count as one year old.
pub fn normalized_citations(citations: Option<u32>, year: Option<i32>, current_year: i32) -> f64 {
    match (citations, year) {
        (Some(c), Some(y)) if c > 0 && y != 0 => {
            let age = (current_year - y).max(1);
            (f64::from(c) / f64::from(age) * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}
