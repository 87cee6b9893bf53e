//! In-memory providers for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cocite_core::Identifier;

use crate::error::{Result, ScienceError};
use crate::http::Delay;
use crate::sources::{CitationProvider, MetadataProvider, WorkMetadata};

pub fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

pub fn ids(list: &[&str]) -> Vec<Identifier> {
    list.iter().map(|s| id(s)).collect()
}

/// Serves fixed lists; unknown identifiers get an empty list.
#[derive(Default)]
pub struct StaticProvider {
    name: String,
    references: HashMap<Identifier, Vec<Identifier>>,
    citations: HashMap<Identifier, Vec<Identifier>>,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_references(mut self, seed: &str, refs: &[&str]) -> Self {
        self.references.insert(id(seed), ids(refs));
        self
    }

    pub fn with_citations(mut self, seed: &str, cites: &[&str]) -> Self {
        self.citations.insert(id(seed), ids(cites));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CitationProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.references.get(id).cloned().unwrap_or_default())
    }

    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.citations.get(id).cloned().unwrap_or_default())
    }
}

/// Fails every call, or only calls for the listed identifiers.
pub struct FailingProvider {
    name: String,
    only: Option<Vec<Identifier>>,
}

impl FailingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            only: None,
        }
    }

    pub fn for_ids(name: &str, list: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            only: Some(ids(list)),
        }
    }

    fn check(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        match &self.only {
            Some(only) if !only.contains(id) => Ok(Vec::new()),
            _ => Err(ScienceError::ApiError(self.name.clone(), "HTTP 500: boom".to_string())),
        }
    }
}

#[async_trait]
impl CitationProvider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        self.check(id)
    }

    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        self.check(id)
    }
}

/// Knows the paper but refuses to share its lists.
pub struct WithheldProvider;

#[async_trait]
impl CitationProvider for WithheldProvider {
    fn name(&self) -> &str {
        "withheld"
    }

    async fn references(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        Err(ScienceError::DataWithheld {
            source_name: "withheld".to_string(),
            what: "references".to_string(),
            identifier: id.to_string(),
        })
    }

    async fn citations(&self, id: &Identifier) -> Result<Vec<Identifier>> {
        Err(ScienceError::DataWithheld {
            source_name: "withheld".to_string(),
            what: "citations".to_string(),
            identifier: id.to_string(),
        })
    }
}

/// Metadata from a fixed table; unknown identifiers fail.
#[derive(Default)]
pub struct StaticMetadata {
    works: HashMap<Identifier, WorkMetadata>,
    pub calls: AtomicUsize,
}

impl StaticMetadata {
    pub fn with(mut self, key: &str, meta: WorkMetadata) -> Self {
        self.works.insert(id(key), meta);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadata {
    async fn metadata(&self, key: &Identifier) -> Result<WorkMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.works
            .get(key)
            .cloned()
            .ok_or_else(|| ScienceError::NotFound(key.to_string()))
    }
}

/// Records every requested wait instead of sleeping.
#[derive(Default)]
pub struct RecordingDelay {
    pub waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}
