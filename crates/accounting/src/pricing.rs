//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1K tokens. Each model has an input and output
//! price. Custom pricing can be added at runtime from config overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use switchboard_core::trace::round6;

/// Per-1K-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1K input tokens in USD.
    pub input_per_k: f64,
    /// Price per 1K output tokens in USD.
    pub output_per_k: f64,
}

impl ModelPricing {
    /// Create a new pricing entry.
    pub fn new(input_per_k: f64, output_per_k: f64) -> Self {
        Self {
            input_per_k,
            output_per_k,
        }
    }

    /// A zero-rate entry, used when even the fallback model is unknown.
    pub fn free() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Input-side cost for a token count, rounded to 6 decimal places.
    pub fn input_cost(&self, tokens: u64) -> f64 {
        round6(tokens as f64 / 1000.0 * self.input_per_k)
    }

    /// Output-side cost for a token count, rounded to 6 decimal places.
    pub fn output_cost(&self, tokens: u64) -> f64 {
        round6(tokens as f64 / 1000.0 * self.output_per_k)
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        // ── OpenAI ─────────────────────────────────────────────────
        prices.insert("gpt-4o".into(), ModelPricing::new(0.005, 0.015));
        prices.insert("gpt-4o-mini".into(), ModelPricing::new(0.00015, 0.0006));
        prices.insert("gpt-3.5-turbo".into(), ModelPricing::new(0.0015, 0.002));
        prices.insert("gpt-4".into(), ModelPricing::new(0.03, 0.06));
        prices.insert("gpt-4-32k".into(), ModelPricing::new(0.06, 0.12));

        // ── Groq-hosted open models ────────────────────────────────
        prices.insert("llama3-8b-8192".into(), ModelPricing::new(0.0005, 0.0008));
        prices.insert("gemma2-9b-it".into(), ModelPricing::new(0.0002, 0.0002));
        prices.insert(
            "llama-3.3-70b-versatile".into(),
            ModelPricing::new(0.0009, 0.0009),
        );

        // ── Google ─────────────────────────────────────────────────
        prices.insert("gemini-2.0-flash".into(), ModelPricing::new(0.00075, 0.003));

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().ok()?;
        prices.get(model).cloned()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(model.into(), pricing);
        }
    }

    /// Resolve pricing for a model, falling back to `default_model`, then to
    /// zero rates. Never fails.
    pub fn resolve(&self, model: &str, default_model: &str) -> ModelPricing {
        self.get(model)
            .or_else(|| self.get(default_model))
            .unwrap_or_else(ModelPricing::free)
    }

    /// List all known model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.prices.read() {
            Ok(prices) => prices.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
