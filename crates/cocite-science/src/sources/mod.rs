use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cocite_core::config::{OPENALEX, SEMANTIC_SCHOLAR};
use cocite_core::{AppConfig, ContributionStats, Direction, Identifier};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};
use crate::http::{Delay, DiskCache, RateLimitedClient, RetryPolicy};

pub mod openalex;
pub mod semantic_scholar;

pub use openalex::OpenAlexSource;
pub use semantic_scholar::SemanticScholarSource;

/// A source of citation-graph edges for a single paper.
///
/// Implementations return whatever they could find; errors are for the
/// caller to isolate (see [`crate::merge::MergedProvider`]).
#[async_trait]
pub trait CitationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Works referenced by `id`.
    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>>;

    /// Works citing `id`.
    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>>;

    async fn fetch(&self, id: &Identifier, direction: Direction) -> Result<Vec<Identifier>> {
        match direction {
            Direction::References => self.references(id).await,
            Direction::Citations => self.citations(id).await,
        }
    }

    /// Like [`fetch`](Self::fetch), plus per-source statistics when the
    /// provider is itself a merge of sub-providers.
    async fn fetch_with_stats(
        &self,
        id: &Identifier,
        direction: Direction,
    ) -> Result<(Vec<Identifier>, Option<ContributionStats>)> {
        Ok((self.fetch(id, direction).await?, None))
    }
}

/// Bibliographic details used to describe a network node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub cited_by_count: Option<u32>,
    pub canonical_url: Option<String>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn metadata(&self, id: &Identifier) -> Result<WorkMetadata>;
}

/// Deduplicate while keeping first-seen order.
pub(crate) fn dedup_identifiers(ids: impl IntoIterator<Item = Identifier>) -> Vec<Identifier> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Shared plumbing for the HTTP-backed sources.
pub struct SourceContext {
    pub client: RateLimitedClient,
    pub cache: Option<DiskCache>,
}

impl SourceContext {
    pub fn new(
        config: &AppConfig,
        namespace: &str,
        min_interval: Duration,
        delay: Arc<dyn Delay>,
    ) -> Result<Self> {
        let client = RateLimitedClient::new(
            min_interval,
            RetryPolicy::from_config(&config.http),
            &config.http.user_agent,
        )?
        .with_delay(delay);
        let cache = config.http.cache_enabled.then(|| {
            DiskCache::new(
                &config.cache_dir(),
                namespace,
                Duration::from_secs(config.http.cache_ttl_secs),
            )
        });
        Ok(Self { client, cache })
    }

    pub(crate) async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match &self.cache {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    pub(crate) async fn store<T: Serialize>(&self, key: &str, value: &T) {
        if let Some(cache) = &self.cache {
            cache.set(key, value).await;
        }
    }
}

/// Instantiate the providers named in `config.providers.enabled`, in order.
pub fn build_providers(
    config: &AppConfig,
    delay: Arc<dyn Delay>,
) -> Result<Vec<Arc<dyn CitationProvider>>> {
    let mut providers: Vec<Arc<dyn CitationProvider>> = Vec::new();
    for name in &config.providers.enabled {
        match name.as_str() {
            OPENALEX => providers.push(Arc::new(OpenAlexSource::from_config(config, delay.clone())?)),
            SEMANTIC_SCHOLAR => providers.push(Arc::new(SemanticScholarSource::from_config(
                config,
                delay.clone(),
            )?)),
            other => {
                return Err(ScienceError::InvalidConfig(format!("unknown provider: {other}")));
            }
        }
    }
    if providers.is_empty() {
        return Err(ScienceError::InvalidConfig("no citation providers enabled".to_string()));
    }
    Ok(providers)
}
