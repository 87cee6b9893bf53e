//! cocite core: identifiers, run records, graph model, configuration.

pub mod config;
pub mod error;
pub mod models;

pub use config::{AnalysisConfig, AppConfig, HttpConfig, NetworkConfig, ProvidersConfig};
pub use error::{CocitationError, ExitCode, Result};
pub use models::*;
