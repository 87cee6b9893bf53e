use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use cocite_core::{ContributionStats, Direction, Identifier, ProviderContribution};
use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{Result, ScienceError};
use crate::sources::CitationProvider;

/// Outcome of one provider call inside a merge.
enum Outcome {
    Found(BTreeSet<Identifier>),
    Withheld,
    Failed,
}

/// Runs several providers side by side and unions what they return.
pub struct MergedProvider {
    providers: Vec<Arc<dyn CitationProvider>>,
}

impl MergedProvider {
    pub fn new(providers: Vec<Arc<dyn CitationProvider>>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &[Arc<dyn CitationProvider>] {
        &self.providers
    }

    /// Fetch `direction` for `id` from every provider concurrently.
    ///
    /// A failing provider contributes nothing and is listed in
    /// [`ContributionStats::failed`]. Only when every provider failed with a
    /// real error does the merge itself fail.
    pub async fn merge_direction(
        &self,
        id: &Identifier,
        direction: Direction,
    ) -> Result<(Vec<Identifier>, ContributionStats)> {
        let calls = self.providers.iter().map(|p| p.fetch(id, direction));
        let results = join_all(calls).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for (provider, result) in self.providers.iter().zip(results) {
            let outcome = match result {
                Ok(list) => Outcome::Found(list.into_iter().collect()),
                Err(e) if e.is_withheld() => {
                    warn!(
                        provider = provider.name(),
                        identifier = %id,
                        direction = %direction,
                        "data withheld by provider, counting as empty"
                    );
                    Outcome::Withheld
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        identifier = %id,
                        direction = %direction,
                        error = %e,
                        "provider fetch failed"
                    );
                    Outcome::Failed
                }
            };
            outcomes.push((provider.name().to_string(), outcome));
        }

        if !outcomes.is_empty() && outcomes.iter().all(|(_, o)| matches!(o, Outcome::Failed)) {
            return Err(ScienceError::AllProvidersFailed(format!("{direction} of {id}")));
        }

        let (merged, stats) = contribution_stats(outcomes);
        info!(
            identifier = %id,
            direction = %direction,
            per_provider = %format_counts(&stats),
            overlap = stats.overlap,
            total_unique = stats.total_unique,
            "merged provider results"
        );
        Ok((merged, stats))
    }
}

fn contribution_stats(outcomes: Vec<(String, Outcome)>) -> (Vec<Identifier>, ContributionStats) {
    let mut seen_by: BTreeMap<Identifier, usize> = BTreeMap::new();
    for (_, outcome) in &outcomes {
        if let Outcome::Found(set) = outcome {
            for id in set {
                *seen_by.entry(id.clone()).or_default() += 1;
            }
        }
    }

    let mut stats = ContributionStats::default();
    for (name, outcome) in outcomes {
        let (count, unique) = match &outcome {
            Outcome::Found(set) => (set.len(), set.iter().filter(|id| seen_by[*id] == 1).count()),
            Outcome::Withheld => (0, 0),
            Outcome::Failed => {
                stats.failed.push(name.clone());
                (0, 0)
            }
        };
        stats.providers.push(ProviderContribution { name, count, unique });
    }
    stats.overlap = seen_by.values().filter(|&&n| n > 1).count();
    stats.total_unique = seen_by.len();

    (seen_by.into_keys().collect(), stats)
}

fn format_counts(stats: &ContributionStats) -> String {
    stats
        .providers
        .iter()
        .map(|p| format!("{}={} ({} unique)", p.name, p.count, p.unique))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl CitationProvider for MergedProvider {
    fn name(&self) -> &str {
        "composite"
    }

    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        Ok(self.merge_direction(id, Direction::References).await?.0)
    }

    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        Ok(self.merge_direction(id, Direction::Citations).await?.0)
    }

    async fn fetch_with_stats(
        &self,
        id: &Identifier,
        direction: Direction,
    ) -> Result<(Vec<Identifier>, Option<ContributionStats>)> {
        let (list, stats) = self.merge_direction(id, direction).await?;
        Ok((list, Some(stats)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingProvider, StaticProvider, WithheldProvider, id, ids};

    fn merged(providers: Vec<Arc<dyn CitationProvider>>) -> MergedProvider {
        MergedProvider::new(providers)
    }

    #[tokio::test]
    async fn overlapping_lists_are_unioned_with_stats() {
        let p1 = StaticProvider::new("one").with_references("10.1/x", &["10.1/a", "10.1/b"]);
        let p2 = StaticProvider::new("two").with_references("10.1/x", &["10.1/b", "10.1/c"]);
        let engine = merged(vec![Arc::new(p1), Arc::new(p2)]);

        let (list, stats) = engine
            .merge_direction(&id("10.1/x"), Direction::References)
            .await
            .unwrap();

        let set: BTreeSet<_> = list.into_iter().collect();
        assert_eq!(set, ids(&["10.1/a", "10.1/b", "10.1/c"]).into_iter().collect());
        assert_eq!(stats.overlap, 1);
        assert_eq!(stats.provider("one").map(|p| p.unique), Some(1));
        assert_eq!(stats.provider("two").map(|p| p.unique), Some(1));
        assert_eq!(stats.total_unique, 3);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn failing_provider_counts_as_zero() {
        let good = StaticProvider::new("good").with_citations("10.1/x", &["10.2/p", "10.2/q"]);
        let engine = merged(vec![Arc::new(FailingProvider::new("bad")), Arc::new(good)]);

        let (list, stats) = engine
            .merge_direction(&id("10.1/x"), Direction::Citations)
            .await
            .unwrap();

        assert_eq!(list, ids(&["10.2/p", "10.2/q"]));
        assert_eq!(stats.provider("bad").map(|p| p.count), Some(0));
        assert_eq!(stats.provider("good").map(|p| p.unique), Some(2));
        assert_eq!(stats.failed, vec!["bad".to_string()]);
        assert_eq!(stats.overlap, 0);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn every_provider_failing_is_an_error() {
        let engine = merged(vec![
            Arc::new(FailingProvider::new("a")),
            Arc::new(FailingProvider::new("b")),
        ]);
        let err = engine
            .merge_direction(&id("10.1/x"), Direction::References)
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn withheld_is_empty_not_failed() {
        let engine = merged(vec![
            Arc::new(WithheldProvider),
            Arc::new(FailingProvider::new("bad")),
        ]);
        let (list, stats) = engine
            .merge_direction(&id("10.1/x"), Direction::References)
            .await
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(stats.failed, vec!["bad".to_string()]);
        assert_eq!(stats.total_unique, 0);
    }

    #[tokio::test]
    async fn duplicates_within_a_provider_are_counted_once() {
        let p1 = StaticProvider::new("one")
            .with_references("10.1/x", &["10.1/a", "10.1/a", "10.1/b"]);
        let engine = merged(vec![Arc::new(p1)]);
        let (list, stats) = engine
            .merge_direction(&id("10.1/x"), Direction::References)
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(stats.provider("one").map(|p| p.count), Some(2));
    }

    #[tokio::test]
    async fn three_way_overlap_stays_consistent() {
        let p1 = StaticProvider::new("one").with_references("10.1/x", &["10.1/a", "10.1/b", "10.1/d"]);
        let p2 = StaticProvider::new("two").with_references("10.1/x", &["10.1/b", "10.1/c"]);
        let p3 = StaticProvider::new("three").with_references("10.1/x", &["10.1/b", "10.1/d", "10.1/e"]);
        let engine = merged(vec![Arc::new(p1), Arc::new(p2), Arc::new(p3)]);

        let (list, stats) = engine
            .merge_direction(&id("10.1/x"), Direction::References)
            .await
            .unwrap();

        assert_eq!(list.len(), 5);
        // b (all three) and d (one, three)
        assert_eq!(stats.overlap, 2);
        assert_eq!(stats.provider("one").map(|p| p.unique), Some(1));
        assert_eq!(stats.provider("two").map(|p| p.unique), Some(1));
        assert_eq!(stats.provider("three").map(|p| p.unique), Some(1));
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn composite_reports_stats_through_the_trait() {
        let p1 = StaticProvider::new("one").with_citations("10.1/x", &["10.1/a"]);
        let engine: Arc<dyn CitationProvider> = Arc::new(merged(vec![Arc::new(p1)]));

        let (list, stats) = engine
            .fetch_with_stats(&id("10.1/x"), Direction::Citations)
            .await
            .unwrap();
        assert_eq!(list, ids(&["10.1/a"]));
        assert_eq!(stats.map(|s| s.total_unique), Some(1));
        assert_eq!(engine.name(), "composite");
    }
}
