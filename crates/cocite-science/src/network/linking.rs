use std::collections::{BTreeMap, BTreeSet};

use cocite_core::{Identifier, Link, LinkingMode, NetworkConfig, RawData};

type IdSet<'a> = BTreeSet<&'a Identifier>;

/// Bijective identifier → node id, numbered in sorted order from zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeIdentity {
    ids: BTreeMap<Identifier, u32>,
}

impl NodeIdentity {
    pub fn assign(candidates: BTreeSet<Identifier>) -> Self {
        Self {
            ids: candidates.into_iter().zip(0u32..).collect(),
        }
    }

    pub fn id_of(&self, id: &Identifier) -> Option<u32> {
        self.ids.get(id).copied()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.ids.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, u32)> {
        self.ids.iter().map(|(k, v)| (k, *v))
    }
}

/// Per-seed reference and citation sets, restricted to seeds in the node set.
struct PairInputs<'a> {
    seeds: Vec<&'a Identifier>,
    references: BTreeMap<&'a Identifier, IdSet<'a>>,
    citations: BTreeMap<&'a Identifier, IdSet<'a>>,
    /// Citation sets cut down to the node set, for plain co-citation.
    restricted_citations: BTreeMap<&'a Identifier, IdSet<'a>>,
}

impl<'a> PairInputs<'a> {
    fn new(raw: &'a RawData, nodes: &NodeIdentity) -> Self {
        let mut inputs = Self {
            seeds: Vec::new(),
            references: BTreeMap::new(),
            citations: BTreeMap::new(),
            restricted_citations: BTreeMap::new(),
        };
        for (seed, record) in raw.iter().filter(|(seed, _)| nodes.contains(seed)) {
            inputs.seeds.push(seed);
            if let Some(refs) = &record.references {
                inputs.references.insert(seed, refs.iter().collect());
            }
            if let Some(cites) = &record.citations {
                let full: IdSet<'a> = cites.iter().collect();
                let restricted = full.iter().copied().filter(|c| nodes.contains(c)).collect();
                inputs.citations.insert(seed, full);
                inputs.restricted_citations.insert(seed, restricted);
            }
        }
        inputs
    }

    fn shared(map: &BTreeMap<&'a Identifier, IdSet<'a>>, a: &Identifier, b: &Identifier) -> Option<usize> {
        let (left, right) = (map.get(a)?, map.get(b)?);
        Some(left.intersection(right).count())
    }

    fn strength(&self, a: &Identifier, b: &Identifier, options: &NetworkConfig) -> Option<f64> {
        match options.mode {
            LinkingMode::BibliographicCoupling => {
                Self::shared(&self.references, a, b).map(|n| n as f64)
            }
            LinkingMode::CoCitation => {
                let citations = if options.include_cociting {
                    &self.citations
                } else {
                    &self.restricted_citations
                };
                Self::shared(citations, a, b).map(|n| n as f64)
            }
            LinkingMode::Amsler => {
                let bc = Self::shared(&self.references, a, b).unwrap_or(0) as f64;
                let cc = Self::shared(&self.citations, a, b).unwrap_or(0) as f64;
                let lambda = options.amsler_lambda;
                Some(lambda * bc + (1.0 - lambda) * cc)
            }
        }
    }
}

/// All links between seeds in the node set whose strength is positive and at
/// least `options.min_strength`. Sorted by `(source_id, target_id)`.
pub fn compute_links(raw: &RawData, nodes: &NodeIdentity, options: &NetworkConfig) -> Vec<Link> {
    let inputs = PairInputs::new(raw, nodes);
    let mut links = Vec::new();

    for (i, a) in inputs.seeds.iter().enumerate() {
        for b in &inputs.seeds[i + 1..] {
            let Some(strength) = inputs.strength(a, b, options) else {
                continue;
            };
            if strength <= 0.0 || strength < options.min_strength {
                continue;
            }
            if let (Some(source_id), Some(target_id)) = (nodes.id_of(a), nodes.id_of(b)) {
                links.push(Link {
                    source_id,
                    target_id,
                    strength,
                });
            }
        }
    }
    links
}
