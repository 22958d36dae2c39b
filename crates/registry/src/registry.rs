//! The registry proper: catalog, startup load, lookup, dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use switchboard_config::{AppConfig, FrameworkConfig};
use switchboard_core::{Adapter, DispatchError, DispatchOutcome, DispatchStatus, HealthInfo};

use crate::http::HttpAdapter;

/// Builds one adapter from its configuration.
pub type AdapterBuilder = fn(&str, &FrameworkConfig) -> Result<Arc<dyn Adapter>, DispatchError>;

/// How one catalog entry fared at load time.
pub enum LoadState {
    Loaded(Arc<dyn Adapter>),
    Failed(String),
}

/// Load/availability report for one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The closed set of frameworks this deployment knows how to reach. Every
/// entry builds the generic HTTP adapter against its configured endpoint.
pub fn builtin_catalog() -> Vec<(&'static str, AdapterBuilder)> {
    fn http_builder(name: &str, config: &FrameworkConfig) -> Result<Arc<dyn Adapter>, DispatchError> {
        let endpoint = config.endpoint.as_deref().ok_or_else(|| {
            DispatchError::LoadFailed(format!("framework '{name}' has no endpoint configured"))
        })?;
        Ok(Arc::new(HttpAdapter::new(name, endpoint)?))
    }

    vec![
        ("langgraph", http_builder as AdapterBuilder),
        ("llamaindex", http_builder),
        ("dspy", http_builder),
        ("autogen", http_builder),
    ]
}

/// Holds every known framework, loaded or not. Names are normalized to
/// lowercase; lookups are case-insensitive.
pub struct FrameworkRegistry {
    entries: HashMap<String, LoadState>,
}

impl FrameworkRegistry {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Load every configured catalog entry. Each entry is attempted
    /// independently; a failed build is recorded, logged, and skipped.
    pub fn load(catalog: Vec<(&str, AdapterBuilder)>, config: &AppConfig) -> Self {
        let mut registry = Self::empty();
        let wanted = config.frameworks_to_load();

        for (name, builder) in catalog {
            let name_lower = name.to_lowercase();
            if !wanted.is_empty() && !wanted.contains(&name_lower) {
                continue;
            }
            let framework_config = config.framework(&name_lower);
            if !framework_config.enabled {
                continue;
            }
            registry.register(&name_lower, builder(&name_lower, &framework_config));
        }

        let loaded = registry
            .entries
            .values()
            .filter(|s| matches!(s, LoadState::Loaded(_)))
            .count();
        info!(
            loaded = loaded,
            total = registry.entries.len(),
            "Framework registry loaded"
        );
        registry
    }

    /// Record a build result under a name. Used by `load` and directly by
    /// hosts that bring their own adapters.
    pub fn register(&mut self, name: &str, result: Result<Arc<dyn Adapter>, DispatchError>) {
        let name = name.to_lowercase();
        let state = match result {
            Ok(adapter) => {
                info!(framework = %name, "Framework adapter loaded");
                LoadState::Loaded(adapter)
            }
            Err(e) => {
                warn!(framework = %name, "Framework adapter failed to load: {e}");
                LoadState::Failed(e.to_string())
            }
        };
        self.entries.insert(name, state);
    }

    /// Look up a loaded adapter by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        match self.entries.get(&name.to_lowercase()) {
            Some(LoadState::Loaded(adapter)) => Some(adapter.clone()),
            _ => None,
        }
    }

    /// Execute a query against a framework. Never raises: an unknown or
    /// broken framework comes back as a structured error outcome. The
    /// recorded duration covers the adapter call only.
    pub async fn dispatch(&self, name: &str, query: &str) -> DispatchOutcome {
        let name_lower = name.to_lowercase();
        let adapter = match self.entries.get(&name_lower) {
            Some(LoadState::Loaded(adapter)) => adapter.clone(),
            Some(LoadState::Failed(error)) => {
                return DispatchOutcome::error(
                    &name_lower,
                    "",
                    format!("Framework '{name_lower}' failed to load: {error}"),
                    0.0,
                );
            }
            None => {
                return DispatchOutcome::error(
                    &name_lower,
                    "",
                    format!("Framework '{name_lower}' not available"),
                    0.0,
                );
            }
        };

        let started = Instant::now();
        let result = adapter.execute(query).await;
        let duration_seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(reply) => DispatchOutcome {
                answer: reply.answer,
                status: DispatchStatus::Success,
                duration_seconds,
                framework: name_lower,
                error: None,
            },
            Err(e) => {
                warn!(framework = %name_lower, "Dispatch failed: {e}");
                DispatchOutcome::error(&name_lower, "", e.to_string(), duration_seconds)
            }
        }
    }

    /// Load status for every known framework.
    pub fn list_available(&self) -> HashMap<String, FrameworkStatus> {
        self.entries
            .iter()
            .map(|(name, state)| {
                let status = match state {
                    LoadState::Loaded(_) => FrameworkStatus {
                        status: "loaded".into(),
                        error: None,
                    },
                    LoadState::Failed(error) => FrameworkStatus {
                        status: "failed".into(),
                        error: Some(error.clone()),
                    },
                };
                (name.clone(), status)
            })
            .collect()
    }

    /// Probe every framework once. Loaded adapters get a live probe call;
    /// failed entries report their load error.
    pub async fn health_check(&self) -> HashMap<String, HealthInfo> {
        let mut results = HashMap::new();
        for (name, state) in &self.entries {
            let info = match state {
                LoadState::Loaded(adapter) => match adapter.probe().await {
                    Ok(()) => HealthInfo::healthy(),
                    Err(e) => HealthInfo::unhealthy(e.to_string()),
                },
                LoadState::Failed(error) => HealthInfo::unhealthy(error.clone()),
            };
            results.insert(name.clone(), info);
        }
        results
    }
}
