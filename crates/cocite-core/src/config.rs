use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CocitationError, Result};
use crate::models::LinkingMode;

pub const OPENALEX: &str = "openalex";
pub const SEMANTIC_SCHOLAR: &str = "semantic_scholar";

/// Root configuration, loaded from `~/.config/cocite/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub http: HttpConfig,
    pub analysis: AnalysisConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Providers merged for every fetch, in reporting order.
    pub enabled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openalex_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key: Option<String>,
    pub openalex_base_url: String,
    pub semantic_scholar_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Wait applied to a 429 response without a usable `Retry-After`.
    pub retry_after_default_secs: u64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Courtesy pause after each successful direction fetch.
    pub pacing_ms: u64,
    pub min_backward_n: usize,
    pub min_forward_m: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mode: LinkingMode,
    pub min_strength: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<usize>,
    pub include_cociting: bool,
    pub amsler_lambda: f64,
    pub layout_seed: u64,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: vec![OPENALEX.to_string(), SEMANTIC_SCHOLAR.to_string()],
            openalex_email: None,
            semantic_scholar_api_key: None,
            openalex_base_url: "https://api.openalex.org".to_string(),
            semantic_scholar_base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("cocite/", env!("CARGO_PKG_VERSION")).to_string(),
            max_retries: 3,
            base_backoff_ms: 1_000,
            retry_after_default_secs: 60,
            cache_enabled: true,
            cache_ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 100,
            min_backward_n: 0,
            min_forward_m: 0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: LinkingMode::BibliographicCoupling,
            min_strength: 1.0,
            max_nodes: None,
            include_cociting: false,
            amsler_lambda: 0.5,
            layout_seed: 42,
        }
    }
}

// ─── Validation ────────────────────────────────────────────

impl AnalysisConfig {
    /// Both thresholds at zero means there is nothing to analyse, unless the
    /// caller only wants the raw collection.
    pub fn validate(&self, base_only: bool) -> Result<()> {
        if !base_only && self.min_backward_n == 0 && self.min_forward_m == 0 {
            return Err(CocitationError::InvalidConfig(
                "specify a non-zero backward (N) and/or forward (M) threshold, or use base-only collection"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.amsler_lambda) {
            return Err(CocitationError::InvalidConfig(format!(
                "amsler lambda must be within [0, 1], got {}",
                self.amsler_lambda
            )));
        }
        if !self.min_strength.is_finite() || self.min_strength < 0.0 {
            return Err(CocitationError::InvalidConfig(format!(
                "minimum link strength must be a non-negative number, got {}",
                self.min_strength
            )));
        }
        if self.max_nodes == Some(0) {
            return Err(CocitationError::InvalidConfig(
                "max nodes must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/cocite/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("COCITE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cocite")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Credentials from the environment win over the file.
    pub fn apply_env(&mut self) {
        if let Ok(email) = std::env::var("OPENALEX_EMAIL") {
            self.providers.openalex_email = Some(email);
        }
        if let Ok(key) = std::env::var("SEMANTIC_SCHOLAR_API_KEY") {
            self.providers.semantic_scholar_api_key = Some(key);
        }
    }

    /// Contact address for the OpenAlex polite pool, if it looks like one.
    pub fn polite_email(&self) -> Option<&str> {
        self.providers
            .openalex_email
            .as_deref()
            .map(str::trim)
            .filter(|email| email.contains('@'))
    }

    /// Directory for cached provider responses.
    pub fn cache_dir(&self) -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("cocite")
    }
}
