use cocite_core::CocitationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error(transparent)]
    Core(#[from] CocitationError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("{source_name} withholds {what} for {identifier}")]
    DataWithheld {
        source_name: String,
        what: String,
        identifier: String,
    },

    #[error("all providers failed to fetch {0}")]
    AllProvidersFailed(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScienceError {
    /// Publisher-restricted data: the source knows the paper but won't share
    /// the list. Callers treat this as an empty result, not a failure.
    pub fn is_withheld(&self) -> bool {
        matches!(self, Self::DataWithheld { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
