use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cocite_core::{
    ContributionStats, Direction, Identifier, NoveltyRelation, RawData, RawRecord, SummaryRecord,
};
use tracing::{debug, info, warn};

use crate::http::Delay;
use crate::sources::CitationProvider;

/// Result of a thresholded run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOutput {
    pub summaries: Vec<SummaryRecord>,
    /// Papers referenced by at least `n` seeds.
    pub backward: Vec<NoveltyRelation>,
    /// Papers citing at least `m` seeds.
    pub forward: Vec<NoveltyRelation>,
    pub raw: RawData,
    pub failed_seeds: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseCollectionOutput {
    pub summaries: Vec<SummaryRecord>,
    pub raw: RawData,
    pub failed_seeds: usize,
}

/// Novel identifier → seeds whose list contains it.
type Tally = BTreeMap<Identifier, BTreeSet<Identifier>>;

struct SeedFetch {
    record: RawRecord,
    summary: SummaryRecord,
    failed: bool,
}

/// Backward/forward novelty discovery over a fixed seed set.
pub struct CocitationAnalyzer {
    provider: Arc<dyn CitationProvider>,
    seeds: BTreeSet<Identifier>,
    pacing: Duration,
    delay: Arc<dyn Delay>,
}

impl CocitationAnalyzer {
    pub fn new(
        provider: Arc<dyn CitationProvider>,
        seeds: BTreeSet<Identifier>,
        pacing: Duration,
        delay: Arc<dyn Delay>,
    ) -> Self {
        Self {
            provider,
            seeds,
            pacing,
            delay,
        }
    }

    pub fn seeds(&self) -> &BTreeSet<Identifier> {
        &self.seeds
    }

    /// Fetch what the thresholds need and report papers that at least
    /// `min_backward_n` seeds reference (backward) or that cite at least
    /// `min_forward_m` seeds (forward). A zero threshold skips that direction.
    pub async fn run_analysis(&self, min_backward_n: usize, min_forward_m: usize) -> AnalysisOutput {
        if min_backward_n == 0 && min_forward_m == 0 {
            warn!("both thresholds are zero, nothing to analyse");
            return AnalysisOutput::default();
        }

        info!(
            seeds = self.seeds.len(),
            provider = self.provider.name(),
            min_backward_n,
            min_forward_m,
            "starting co-citation analysis"
        );

        let mut output = AnalysisOutput::default();
        let mut backward = Tally::new();
        let mut forward = Tally::new();

        for (index, seed) in self.seeds.iter().enumerate() {
            debug!(seed = %seed, progress = index + 1, total = self.seeds.len(), "processing seed");
            let fetched = self
                .fetch_seed(seed, min_backward_n > 0, min_forward_m > 0)
                .await;

            if let Some(refs) = &fetched.record.references {
                self.tally(&mut backward, seed, refs);
            }
            if let Some(cites) = &fetched.record.citations {
                self.tally(&mut forward, seed, cites);
            }

            output.failed_seeds += usize::from(fetched.failed);
            output.summaries.push(fetched.summary);
            output.raw.insert(seed.clone(), fetched.record);
        }

        if min_backward_n > 0 {
            output.backward = relations(backward, min_backward_n);
        }
        if min_forward_m > 0 {
            output.forward = relations(forward, min_forward_m);
        }

        info!(
            backward = output.backward.len(),
            forward = output.forward.len(),
            failed_seeds = output.failed_seeds,
            "analysis complete"
        );
        output
    }

    /// Fetch both directions for every seed without any thresholding.
    pub async fn run_base_collection(&self) -> BaseCollectionOutput {
        info!(
            seeds = self.seeds.len(),
            provider = self.provider.name(),
            "starting base collection"
        );

        let mut output = BaseCollectionOutput::default();
        for seed in &self.seeds {
            let fetched = self.fetch_seed(seed, true, true).await;
            output.failed_seeds += usize::from(fetched.failed);
            output.summaries.push(fetched.summary);
            output.raw.insert(seed.clone(), fetched.record);
        }

        info!(
            collected = output.raw.len(),
            failed_seeds = output.failed_seeds,
            "base collection complete"
        );
        output
    }

    async fn fetch_seed(&self, seed: &Identifier, want_refs: bool, want_cites: bool) -> SeedFetch {
        let (references, reference_stats) = if want_refs {
            self.fetch_direction(seed, Direction::References).await
        } else {
            (None, None)
        };
        let (citations, citation_stats) = if want_cites {
            self.fetch_direction(seed, Direction::Citations).await
        } else {
            (None, None)
        };

        let failed = (want_refs || want_cites)
            && (!want_refs || references.is_none())
            && (!want_cites || citations.is_none());
        if failed {
            warn!(seed = %seed, "no data could be fetched for seed");
        }

        let summary = SummaryRecord {
            identifier: seed.clone(),
            references_found: distinct_len(references.as_deref()),
            citations_found: distinct_len(citations.as_deref()),
            provider: self.provider.name().to_string(),
            reference_stats,
            citation_stats,
            retrieved_at: Utc::now(),
        };

        SeedFetch {
            record: RawRecord::new(references, citations),
            summary,
            failed,
        }
    }

    /// `None` on failure. Publisher-withheld data is an empty success.
    async fn fetch_direction(
        &self,
        seed: &Identifier,
        direction: Direction,
    ) -> (Option<Vec<Identifier>>, Option<ContributionStats>) {
        match self.provider.fetch_with_stats(seed, direction).await {
            Ok((list, stats)) => {
                self.delay.sleep(self.pacing).await;
                (Some(list), stats)
            }
            Err(e) if e.is_withheld() => {
                warn!(seed = %seed, direction = %direction, "data withheld by provider");
                self.delay.sleep(self.pacing).await;
                (Some(Vec::new()), None)
            }
            Err(e) => {
                warn!(seed = %seed, direction = %direction, error = %e, "fetch failed");
                (None, None)
            }
        }
    }

    fn tally(&self, tally: &mut Tally, seed: &Identifier, list: &[Identifier]) {
        for novel in list.iter().filter(|id| !self.seeds.contains(*id)) {
            tally.entry(novel.clone()).or_default().insert(seed.clone());
        }
    }
}

fn distinct_len(list: Option<&[Identifier]>) -> usize {
    list.map(|l| l.iter().collect::<BTreeSet<_>>().len())
        .unwrap_or(0)
}

/// One relation per contributing seed, for identifiers with at least
/// `threshold` contributors. Sorted by `(novel, seed)`.
fn relations(tally: Tally, threshold: usize) -> Vec<NoveltyRelation> {
    tally
        .into_iter()
        .filter(|(_, seeds)| seeds.len() >= threshold)
        .flat_map(|(novel, seeds)| {
            seeds
                .into_iter()
                .map(move |seed| NoveltyRelation::new(novel.clone(), seed))
        })
        .collect()
}
