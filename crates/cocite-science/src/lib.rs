//! cocite science: provider adapters, multi-source merging, co-citation
//! analysis and similarity networks.

pub mod analysis;
pub mod error;
pub mod formats;
pub mod http;
pub mod merge;
pub mod network;
pub mod sources;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{AnalysisOutput, BaseCollectionOutput, CocitationAnalyzer};
pub use error::{Result, ScienceError};
pub use http::{Delay, NoDelay, TokioDelay};
pub use merge::MergedProvider;
pub use network::NetworkBuilder;
pub use sources::{
    CitationProvider, MetadataProvider, OpenAlexSource, SemanticScholarSource, WorkMetadata,
    build_providers,
};
