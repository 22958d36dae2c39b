//! Query execution pipeline and app wiring.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use switchboard_accounting::{CostAccountant, ModelPricing, PricingTable};
use switchboard_config::AppConfig;
use switchboard_core::{
    DispatchStatus, HealthInfo, QueryRequest, ResultEnvelope, StoreError, Trace, TraceStatus,
};
use switchboard_registry::{builtin_catalog, FrameworkRegistry, FrameworkStatus};
use switchboard_store::SqliteStore;
use switchboard_telemetry::{MetricsRegistry, TraceLifecycle};

use crate::clean::clean_response;

/// Failures while wiring the pipeline at startup. Once running, nothing in
/// the pipeline returns errors to the caller.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Wire a complete pipeline from configuration: store, pricing (built-in
/// table plus config overrides), metrics, lifecycle, and the framework
/// registry from the builtin catalog.
pub async fn bootstrap(config: &AppConfig) -> Result<Orchestrator, BootstrapError> {
    let store = Arc::new(SqliteStore::new(&config.database.path).await?);

    let pricing = PricingTable::with_defaults();
    for (model, rates) in &config.pricing {
        pricing.set(
            model.clone(),
            ModelPricing::new(rates.input_per_k, rates.output_per_k),
        );
    }
    let accountant = Arc::new(CostAccountant::new(pricing, &config.default_model));

    let metrics = Arc::new(MetricsRegistry::new()?);
    let lifecycle = Arc::new(TraceLifecycle::new(
        store.clone(),
        accountant.clone(),
        metrics.clone(),
    ));
    let registry = FrameworkRegistry::load(builtin_catalog(), config);

    Ok(Orchestrator::new(registry, lifecycle, accountant, store, config))
}

/// Runs queries end to end. One per process, explicitly constructed.
pub struct Orchestrator {
    registry: FrameworkRegistry,
    lifecycle: Arc<TraceLifecycle>,
    accountant: Arc<CostAccountant>,
    store: Arc<SqliteStore>,
    default_model: String,
    default_vector_store: String,
}

impl Orchestrator {
    pub fn new(
        registry: FrameworkRegistry,
        lifecycle: Arc<TraceLifecycle>,
        accountant: Arc<CostAccountant>,
        store: Arc<SqliteStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            accountant,
            store,
            default_model: config.default_model.clone(),
            default_vector_store: config.default_vector_store.clone(),
        }
    }

    /// Execute one query through the full pipeline.
    ///
    /// Always returns a complete envelope; dispatch failures surface as
    /// `status = error` with a human-readable answer.
    pub async fn execute_query(&self, mut request: QueryRequest) -> ResultEnvelope {
        request.framework = request.framework.to_lowercase();
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }
        if request.vector_store.is_empty() {
            request.vector_store = self.default_vector_store.clone();
        }

        let trace_id = self.lifecycle.start(&request).await;

        let mut init_data = serde_json::Map::new();
        init_data.insert("framework".into(), serde_json::json!(request.framework));
        self.lifecycle
            .add_step(&trace_id, "framework_initialization", init_data)
            .await;

        let outcome = self
            .registry
            .dispatch(&request.framework, &request.query)
            .await;

        match outcome.status {
            DispatchStatus::Success => {
                let cleaned = clean_response(&outcome.answer);

                let (actual_input, actual_output) = self.accountant.extract_tokens(&outcome.answer);
                let costs = self.accountant.price_call(
                    &request.query,
                    &cleaned,
                    &request.model,
                    actual_input,
                    actual_output,
                );

                let mut exec_data = serde_json::Map::new();
                exec_data.insert("query_length".into(), serde_json::json!(request.query.len()));
                exec_data.insert("response_length".into(), serde_json::json!(cleaned.len()));
                exec_data.insert("duration".into(), serde_json::json!(outcome.duration_seconds));
                exec_data.insert("input_tokens".into(), serde_json::json!(costs.input_tokens));
                exec_data.insert("output_tokens".into(), serde_json::json!(costs.output_tokens));
                exec_data.insert("total_tokens".into(), serde_json::json!(costs.total_tokens));
                exec_data.insert("input_cost".into(), serde_json::json!(costs.input_cost));
                exec_data.insert("output_cost".into(), serde_json::json!(costs.output_cost));
                exec_data.insert("total_cost".into(), serde_json::json!(costs.total_cost));
                exec_data.insert("status".into(), serde_json::json!("completed"));
                self.lifecycle
                    .add_step(&trace_id, "query_execution", exec_data)
                    .await;

                self.lifecycle
                    .end(&trace_id, TraceStatus::Completed, Some(&cleaned), None)
                    .await;

                let envelope = self.envelope(&trace_id, &request, cleaned, None).await;
                info!(
                    trace_id = %trace_id,
                    framework = %request.framework,
                    model = %request.model,
                    duration_seconds = envelope.duration_seconds,
                    total_cost = envelope.total_cost,
                    "Query completed"
                );
                envelope
            }
            DispatchStatus::Error => {
                let message = outcome
                    .error
                    .unwrap_or_else(|| "unknown dispatch failure".to_string());

                let mut exec_data = serde_json::Map::new();
                exec_data.insert("duration".into(), serde_json::json!(outcome.duration_seconds));
                exec_data.insert("status".into(), serde_json::json!("failed"));
                exec_data.insert("error".into(), serde_json::json!(message));
                self.lifecycle
                    .add_step(&trace_id, "query_execution", exec_data)
                    .await;

                self.lifecycle
                    .end(&trace_id, TraceStatus::Failed, None, Some(&message))
                    .await;

                error!(
                    trace_id = %trace_id,
                    framework = %request.framework,
                    "Query failed: {message}"
                );
                self.envelope(
                    &trace_id,
                    &request,
                    format!("Error: {message}"),
                    Some(message),
                )
                .await
            }
        }
    }

    /// Build the caller's envelope from the closed trace. When the trace
    /// cannot be read back (degraded store), the accountant re-prices the
    /// call so the envelope still carries consistent numbers.
    async fn envelope(
        &self,
        trace_id: &str,
        request: &QueryRequest,
        answer: String,
        error: Option<String>,
    ) -> ResultEnvelope {
        let status = if error.is_none() {
            DispatchStatus::Success
        } else {
            DispatchStatus::Error
        };

        let trace = match self.lifecycle.get_trace(trace_id).await {
            Some(trace) => trace,
            None => {
                let response = if error.is_none() { answer.as_str() } else { "" };
                let breakdown =
                    self.accountant
                        .price_call(&request.query, response, &request.model, None, None);
                let mut fallback = Trace::new(request, "");
                fallback.finish(
                    if error.is_none() {
                        TraceStatus::Completed
                    } else {
                        TraceStatus::Failed
                    },
                    None,
                    0.0,
                    breakdown.input_tokens,
                    breakdown.output_tokens,
                    breakdown.input_cost,
                    breakdown.output_cost,
                    error.clone(),
                );
                fallback
            }
        };

        ResultEnvelope {
            answer,
            trace_id: trace_id.to_string(),
            framework: request.framework.clone(),
            model: request.model.clone(),
            vector_store: request.vector_store.clone(),
            duration_seconds: trace.duration_seconds.unwrap_or(0.0),
            input_tokens: trace.input_tokens,
            output_tokens: trace.output_tokens,
            total_tokens: trace.total_tokens,
            input_cost: trace.input_cost,
            output_cost: trace.output_cost,
            total_cost: trace.total_cost,
            status,
            error,
        }
    }

    /// Load status for every known framework.
    pub fn list_available(&self) -> std::collections::HashMap<String, FrameworkStatus> {
        self.registry.list_available()
    }

    /// Probe all frameworks and persist the results to the health history.
    pub async fn health_sweep(&self) -> std::collections::HashMap<String, HealthInfo> {
        let results = self.registry.health_check().await;
        self.store.save_health(&results).await;
        results
    }

    /// Advisory maintenance: retention cleanup plus the stuck-trace sweep.
    /// Returns `(rows_removed, traces_reconciled)`. Never run on the query
    /// path.
    pub async fn maintenance(&self, retention_days: u32, stuck_minutes: u32) -> (u64, u64) {
        let removed = self.store.cleanup(retention_days).await;
        let reconciled = self.store.reconcile_stuck(stuck_minutes).await;
        (removed, reconciled)
    }

    pub fn lifecycle(&self) -> &TraceLifecycle {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use switchboard_core::{Adapter, AdapterReply, DispatchError};

    struct ScriptedAdapter {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl Adapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, _query: &str) -> Result<AdapterReply, DispatchError> {
            match &self.reply {
                Ok(answer) => Ok(AdapterReply {
                    answer: answer.clone(),
                }),
                Err(message) => Err(DispatchError::Backend(message.clone())),
            }
        }
    }

    async fn orchestrator_with(name: &str, reply: Result<String, String>) -> Orchestrator {
        let config = AppConfig::default();
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let accountant = Arc::new(CostAccountant::new(
            PricingTable::with_defaults(),
            &config.default_model,
        ));
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let lifecycle = Arc::new(TraceLifecycle::new(
            store.clone(),
            accountant.clone(),
            metrics,
        ));
        let mut registry = FrameworkRegistry::empty();
        registry.register(name, Ok(Arc::new(ScriptedAdapter { reply }) as Arc<dyn Adapter>));
        Orchestrator::new(registry, lifecycle, accountant, store, &config)
    }

    fn request(framework: &str) -> QueryRequest {
        QueryRequest {
            framework: framework.into(),
            model: String::new(),
            vector_store: String::new(),
            query: "show me the running containers".into(),
        }
    }

    #[tokio::test]
    async fn successful_query_returns_cleaned_envelope() {
        let orchestrator = orchestrator_with(
            "langgraph",
            Ok("Response: docker ps\n\n\nResult".to_string()),
        )
        .await;

        let envelope = orchestrator.execute_query(request("LangGraph")).await;

        assert_eq!(envelope.status, DispatchStatus::Success);
        assert_eq!(envelope.answer, "docker ps\n\nResult");
        assert_eq!(envelope.framework, "langgraph");
        assert_eq!(envelope.model, "gpt-4o-mini");
        assert_eq!(envelope.vector_store, "faiss");
        assert!(envelope.error.is_none());
        assert_eq!(
            envelope.total_tokens,
            envelope.input_tokens + envelope.output_tokens
        );
        assert!(envelope.total_tokens > 0);
    }

    #[tokio::test]
    async fn successful_query_persists_completed_trace_with_steps() {
        let orchestrator = orchestrator_with("langgraph", Ok("fine".to_string())).await;
        let envelope = orchestrator.execute_query(request("langgraph")).await;

        let trace = orchestrator
            .lifecycle()
            .get_trace(&envelope.trace_id)
            .await
            .unwrap();
        assert_eq!(trace.status, TraceStatus::Completed);
        assert_eq!(trace.response.as_deref(), Some("fine"));
        let names: Vec<&str> = trace.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["framework_initialization", "query_execution"]);
    }

    #[tokio::test]
    async fn query_execution_step_carries_token_and_cost_fields() {
        let orchestrator = orchestrator_with(
            "langgraph",
            Ok("done. usage: input tokens: 37, output tokens: 12".to_string()),
        )
        .await;
        let envelope = orchestrator.execute_query(request("langgraph")).await;

        let trace = orchestrator
            .lifecycle()
            .get_trace(&envelope.trace_id)
            .await
            .unwrap();
        let step = trace
            .steps
            .iter()
            .find(|s| s.name == "query_execution")
            .unwrap();

        assert_eq!(step.data["input_tokens"], serde_json::json!(37));
        assert_eq!(step.data["output_tokens"], serde_json::json!(12));
        assert_eq!(step.data["total_tokens"], serde_json::json!(49));
        assert!(step.data["input_cost"].as_f64().unwrap() > 0.0);
        assert!(step.data["output_cost"].as_f64().unwrap() > 0.0);
        let total = step.data["total_cost"].as_f64().unwrap();
        let parts = step.data["input_cost"].as_f64().unwrap()
            + step.data["output_cost"].as_f64().unwrap();
        assert!((total - parts).abs() < 1e-9);
        assert_eq!(step.data["status"], serde_json::json!("completed"));
    }

    #[tokio::test]
    async fn failing_adapter_yields_error_envelope() {
        let orchestrator =
            orchestrator_with("crewai", Err("connection refused".to_string())).await;
        let envelope = orchestrator.execute_query(request("crewai")).await;

        assert_eq!(envelope.status, DispatchStatus::Error);
        assert!(envelope.answer.starts_with("Error: "));
        assert!(envelope.answer.contains("connection refused"));
        assert_eq!(envelope.output_tokens, 0);
        assert_eq!(envelope.output_cost, 0.0);
        assert_eq!(envelope.total_cost, envelope.input_cost);
        assert!(envelope.input_tokens > 0);

        let trace = orchestrator
            .lifecycle()
            .get_trace(&envelope.trace_id)
            .await
            .unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert!(trace.error_message.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn unknown_framework_yields_error_envelope() {
        let orchestrator = orchestrator_with("langgraph", Ok("x".to_string())).await;
        let envelope = orchestrator.execute_query(request("ghost")).await;

        assert_eq!(envelope.status, DispatchStatus::Error);
        assert!(envelope.answer.contains("not available"));
        assert_eq!(envelope.framework, "ghost");
    }

    #[tokio::test]
    async fn empty_answer_becomes_placeholder() {
        let orchestrator = orchestrator_with("langgraph", Ok(String::new())).await;
        let envelope = orchestrator.execute_query(request("langgraph")).await;
        assert_eq!(envelope.answer, "No response generated.");
        assert_eq!(envelope.status, DispatchStatus::Success);
    }

    #[tokio::test]
    async fn health_sweep_persists_probe_results() {
        let orchestrator = orchestrator_with("langgraph", Ok("ok".to_string())).await;
        let results = orchestrator.health_sweep().await;
        assert!(results["langgraph"].test_passed);

        let history = orchestrator.store.health_history(1).await;
        assert_eq!(history["langgraph"].len(), 1);
    }

    #[tokio::test]
    async fn maintenance_runs_both_sweeps() {
        let orchestrator = orchestrator_with("langgraph", Ok("ok".to_string())).await;
        orchestrator.execute_query(request("langgraph")).await;
        let (removed, reconciled) = orchestrator.maintenance(30, 60).await;
        assert_eq!(removed, 0);
        assert_eq!(reconciled, 0);
    }
}
