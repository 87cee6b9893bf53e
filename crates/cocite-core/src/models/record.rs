use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifier::{Direction, Identifier};

/// How much one provider contributed to a merged list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderContribution {
    pub name: String,
    /// Distinct identifiers this provider returned.
    pub count: usize,
    /// Identifiers no other provider returned.
    pub unique: usize,
}

/// Per-source statistics for one merged identifier/direction.
///
/// `total_unique == sum(unique) + overlap`, where `overlap` counts identifiers
/// returned by two or more providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionStats {
    pub providers: Vec<ProviderContribution>,
    pub overlap: usize,
    pub total_unique: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl ContributionStats {
    pub fn provider(&self, name: &str) -> Option<&ProviderContribution> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn is_consistent(&self) -> bool {
        self.providers.iter().map(|p| p.unique).sum::<usize>() + self.overlap == self.total_unique
    }
}

/// One line of the per-seed run summary. Built once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub identifier: Identifier,
    pub references_found: usize,
    pub citations_found: usize,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_stats: Option<ContributionStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_stats: Option<ContributionStats>,
    pub retrieved_at: DateTime<Utc>,
}

/// `novel` is referenced by `seed` (backward) or cites `seed` (forward).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoveltyRelation {
    pub novel: Identifier,
    pub seed: Identifier,
}

impl NoveltyRelation {
    pub fn new(novel: Identifier, seed: Identifier) -> Self {
        Self { novel, seed }
    }
}

/// Raw fetch result for one seed. `None` means the fetch failed or was not
/// attempted; `Some(vec![])` means it succeeded with nothing to report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub references: Option<Vec<Identifier>>,
    #[serde(default)]
    pub citations: Option<Vec<Identifier>>,
}

impl RawRecord {
    pub fn new(references: Option<Vec<Identifier>>, citations: Option<Vec<Identifier>>) -> Self {
        Self {
            references,
            citations,
        }
    }

    pub fn get(&self, direction: Direction) -> Option<&[Identifier]> {
        match direction {
            Direction::References => self.references.as_deref(),
            Direction::Citations => self.citations.as_deref(),
        }
    }
}

/// Seed identifier → its raw reference/citation lists. This is what the
/// network builder consumes and what `detailed_references_citations.json` holds.
pub type RawData = BTreeMap<Identifier, RawRecord>;
