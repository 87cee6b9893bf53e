//! Similarity networks over a set of seed papers.
//!
//! Nodes are numbered over the sorted candidate set, links are computed
//! pairwise between seeds under one [`LinkingMode`], and only linked nodes
//! are described and placed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use cocite_core::{
    GraphStructure, Identifier, Link, LinkingMode, NetworkConfig, NodeRecord, NodeScores,
    NodeWeights, RawData,
};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sources::MetadataProvider;

pub mod describe;
pub mod layout;
pub mod linking;

pub use describe::NodeDetails;
pub use layout::CoordinateAllocator;
pub use linking::{NodeIdentity, compute_links};

pub struct NetworkBuilder {
    metadata: Option<Arc<dyn MetadataProvider>>,
    current_year: i32,
}

impl NetworkBuilder {
    /// Without a metadata provider every node gets placeholder details.
    pub fn new(metadata: Option<Arc<dyn MetadataProvider>>) -> Self {
        Self {
            metadata,
            current_year: Utc::now().year(),
        }
    }

    /// Reference year for normalized citation counts.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub async fn build(&self, raw: &RawData, options: &NetworkConfig) -> Result<GraphStructure> {
        options.validate()?;

        let candidates = candidates(raw, options.include_cociting);
        let candidate_count = candidates.len();
        let nodes = NodeIdentity::assign(truncate(candidates, raw, options.max_nodes));
        info!(
            mode = %options.mode,
            candidates = candidate_count,
            nodes = nodes.len(),
            "building network"
        );

        let links = compute_links(raw, &nodes, options);
        if links.is_empty() {
            warn!(mode = %options.mode, "no links above the strength threshold");
            return Ok(GraphStructure::default());
        }

        let incident = incident_weights(&links);
        let mut layout = CoordinateAllocator::new(options.layout_seed);
        let mut records = Vec::with_capacity(incident.len());
        for (identifier, node_id) in nodes.iter() {
            let Some(&(link_count, total_strength)) = incident.get(&node_id) else {
                continue;
            };
            let details = self.describe(identifier).await;
            let citations = f64::from(details.citations.unwrap_or(0));
            let norm_citations =
                describe::normalized_citations(details.citations, details.year, self.current_year);
            let (x, y) = layout.next_point();

            records.push(NodeRecord {
                id: node_id,
                identifier: identifier.clone(),
                label: details.label,
                description: details.description,
                url: details.url,
                x,
                y,
                cluster: 1,
                weights: NodeWeights {
                    links: link_count as f64,
                    total_link_strength: total_strength,
                    citations,
                    norm_citations,
                },
                scores: NodeScores {
                    pub_year: f64::from(details.year.unwrap_or(0)),
                    citations,
                    norm_citations,
                },
            });
        }

        info!(nodes = records.len(), links = links.len(), "network built");
        Ok(GraphStructure {
            nodes: records,
            links,
        })
    }

    async fn describe(&self, id: &Identifier) -> NodeDetails {
        let Some(provider) = &self.metadata else {
            return NodeDetails::placeholder(id);
        };
        match provider.metadata(id).await {
            Ok(meta) => NodeDetails::from_metadata(id, &meta),
            Err(e) => {
                debug!(identifier = %id, error = %e, "metadata unavailable, using placeholder");
                NodeDetails::placeholder(id)
            }
        }
    }
}

/// Seeds, everything they reference and, with `include_cociting`,
/// everything citing them.
pub fn candidates(raw: &RawData, include_cociting: bool) -> BTreeSet<Identifier> {
    let mut set: BTreeSet<Identifier> = raw.keys().cloned().collect();
    for record in raw.values() {
        set.extend(record.references.iter().flatten().cloned());
        if include_cociting {
            set.extend(record.citations.iter().flatten().cloned());
        }
    }
    set
}

/// Cap the candidate set at `max_nodes`. Seeds go first; other candidates
/// fill the remaining room in sorted order. When the seeds alone exceed the
/// cap they are cut too.
pub fn truncate(
    candidates: BTreeSet<Identifier>,
    raw: &RawData,
    max_nodes: Option<usize>,
) -> BTreeSet<Identifier> {
    let Some(max) = max_nodes.filter(|&max| candidates.len() > max) else {
        return candidates;
    };

    if raw.len() > max {
        warn!(
            seeds = raw.len(),
            max_nodes = max,
            "seed count exceeds max_nodes, dropping seeds"
        );
        return raw.keys().take(max).cloned().collect();
    }

    let room = max - raw.len();
    let mut kept: BTreeSet<Identifier> = raw.keys().cloned().collect();
    kept.extend(
        candidates
            .into_iter()
            .filter(|id| !raw.contains_key(id))
            .take(room),
    );
    kept
}

/// Node id → (link count, total strength).
fn incident_weights(links: &[Link]) -> BTreeMap<u32, (usize, f64)> {
    let mut weights: BTreeMap<u32, (usize, f64)> = BTreeMap::new();
    for link in links {
        for node in [link.source_id, link.target_id] {
            let entry = weights.entry(node).or_default();
            entry.0 += 1;
            entry.1 += link.strength;
        }
    }
    weights
}

/// Default output file name for a mode, e.g. `network_amsler.json`.
pub fn network_file_name(mode: LinkingMode) -> String {
    format!("network_{}.json", mode.as_str())
}
