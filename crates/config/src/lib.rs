//! Configuration loading and validation for Switchboard.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Every knob the pipeline consumes is enumerated here — there are no hidden
//! globals.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default model for pricing and labels when a request omits one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default vector store label.
    #[serde(default = "default_vector_store")]
    pub default_vector_store: String,

    /// Frameworks the registry should load at startup. Empty = load every
    /// entry in `frameworks` that is enabled.
    #[serde(default)]
    pub enabled_frameworks: Vec<String>,

    /// Storage configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Per-framework adapter settings.
    #[serde(default)]
    pub frameworks: HashMap<String, FrameworkConfig>,

    /// Pricing-table overrides, keyed by model name. Rates are USD per 1K
    /// tokens, merged on top of the built-in table.
    #[serde(default)]
    pub pricing: HashMap<String, PricingOverrideConfig>,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_vector_store() -> String {
    "faiss".into()
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path. `":memory:"` gives an ephemeral database.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Age cutoff for the retention cleanup, in days.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_db_path() -> String {
    "switchboard.db".into()
}
fn default_retention_days() -> u32 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: default_retention_days(),
        }
    }
}

/// Settings for one framework adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Backend endpoint URL for HTTP adapters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Whether this framework participates in the startup load.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            enabled: true,
        }
    }
}

/// Custom per-1K-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1K input tokens in USD.
    pub input_per_k: f64,
    /// Price per 1K output tokens in USD.
    pub output_per_k: f64,
}

impl AppConfig {
    /// Load configuration from the default path with environment overrides.
    ///
    /// Environment variables (highest priority):
    /// - `SWITCHBOARD_CONFIG` — config file path
    /// - `SWITCHBOARD_MODEL` — default model
    /// - `SWITCHBOARD_VECTOR_STORE` — default vector store
    /// - `SWITCHBOARD_FRAMEWORKS` — comma-separated enabled framework names
    /// - `SWITCHBOARD_DB_PATH` — database path
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SWITCHBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("switchboard.toml"));
        let mut config = Self::load_from(&path)?;

        if let Ok(model) = std::env::var("SWITCHBOARD_MODEL") {
            config.default_model = model;
        }
        if let Ok(store) = std::env::var("SWITCHBOARD_VECTOR_STORE") {
            config.default_vector_store = store;
        }
        if let Ok(frameworks) = std::env::var("SWITCHBOARD_FRAMEWORKS") {
            config.enabled_frameworks = frameworks
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(db_path) = std::env::var("SWITCHBOARD_DB_PATH") {
            config.database.path = db_path;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error — defaults are returned.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".into(),
            ));
        }
        if self.database.retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "database.retention_days must be at least 1".into(),
            ));
        }
        for (model, pricing) in &self.pricing {
            if pricing.input_per_k < 0.0 || pricing.output_per_k < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "pricing for '{model}' must be non-negative"
                )));
            }
        }
        Ok(())
    }

    /// The frameworks the registry should attempt to load, lowercased.
    ///
    /// An explicit `enabled_frameworks` list wins; otherwise every enabled
    /// entry of the `frameworks` table participates.
    pub fn frameworks_to_load(&self) -> Vec<String> {
        if !self.enabled_frameworks.is_empty() {
            return self
                .enabled_frameworks
                .iter()
                .map(|s| s.to_lowercase())
                .collect();
        }
        let mut names: Vec<String> = self
            .frameworks
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.to_lowercase())
            .collect();
        names.sort();
        names
    }

    /// Settings for one framework, matched case-insensitively, falling back
    /// to defaults when absent.
    pub fn framework(&self, name: &str) -> FrameworkConfig {
        self.frameworks
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, cfg)| cfg.clone())
            .unwrap_or_default()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_vector_store: default_vector_store(),
            enabled_frameworks: vec![],
            database: DatabaseConfig::default(),
            frameworks: HashMap::new(),
            pricing: HashMap::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
