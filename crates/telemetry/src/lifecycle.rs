//! The trace lifecycle: start, step, end.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_accounting::CostAccountant;
use switchboard_core::{MetricRecord, QueryRequest, Step, Trace, TraceStatus};
use switchboard_store::{MetricsSummary, SqliteStore};

use crate::metrics::MetricsRegistry;

/// Drives traces through their lifecycle and fans the results out to the
/// store and the metric families.
///
/// One `session_id` is generated per instance; every trace started through
/// this lifecycle belongs to that session.
pub struct TraceLifecycle {
    store: Arc<SqliteStore>,
    accountant: Arc<CostAccountant>,
    metrics: Arc<MetricsRegistry>,
    session_id: String,
}

impl TraceLifecycle {
    pub fn new(
        store: Arc<SqliteStore>,
        accountant: Arc<CostAccountant>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        info!(session_id = %session_id, "Trace lifecycle started");
        Self {
            store,
            accountant,
            metrics,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open a new trace for a request and return its id.
    ///
    /// The trace id is returned even when persistence fails; downstream
    /// steps against an unpersisted id are logged and dropped.
    pub async fn start(&self, request: &QueryRequest) -> String {
        let trace = Trace::new(request, &self.session_id);
        let trace_id = trace.trace_id.clone();

        self.store.save_trace(&trace).await;
        self.store.record_session(&self.session_id).await;
        self.metrics.active_requests.inc();

        info!(
            trace_id = %trace_id,
            framework = %request.framework,
            model = %request.model,
            "Trace started"
        );
        trace_id
    }

    /// Append a step to an open trace.
    ///
    /// Any `tokens` value in the payload is accumulated into the trace's
    /// running counter. Load-modify-save without a per-trace lock; two
    /// concurrent steps on the same trace can lose one update, which is
    /// acceptable for advisory counters.
    pub async fn add_step(
        &self,
        trace_id: &str,
        name: &str,
        data: serde_json::Map<String, serde_json::Value>,
    ) {
        let Some(mut trace) = self.store.get_trace(trace_id).await else {
            warn!(trace_id = %trace_id, step = %name, "Step for unknown trace dropped");
            return;
        };

        let step = Step::new(name, data);
        if let Some(tokens) = step.tokens() {
            self.metrics
                .tokens_total
                .with_label_values(&[&trace.framework, &trace.model, "step"])
                .inc_by(tokens);
        }
        trace.add_step(step);
        self.store.save_trace(&trace).await;
    }

    /// Close a trace with a terminal status, pricing the call and emitting
    /// the metric snapshot.
    ///
    /// Calling end twice overwrites the terminal fields (last write wins)
    /// and appends a second snapshot; the active gauge is only decremented
    /// on the first close.
    pub async fn end(
        &self,
        trace_id: &str,
        status: TraceStatus,
        response: Option<&str>,
        error: Option<&str>,
    ) {
        if !status.is_terminal() {
            warn!(trace_id = %trace_id, status = %status, "Ignoring non-terminal end");
            return;
        }
        let Some(mut trace) = self.store.get_trace(trace_id).await else {
            warn!(trace_id = %trace_id, "End for unknown trace dropped");
            return;
        };

        let was_open = !trace.is_terminal();
        if !was_open {
            warn!(trace_id = %trace_id, "Trace already ended, overwriting terminal fields");
        }

        let duration_seconds = (Utc::now() - trace.metrics.start_time)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;

        let breakdown = self.accountant.price_call(
            &trace.query,
            response.unwrap_or(""),
            &trace.model,
            None,
            None,
        );

        trace.finish(
            status,
            response.map(str::to_string),
            duration_seconds,
            breakdown.input_tokens,
            breakdown.output_tokens,
            breakdown.input_cost,
            breakdown.output_cost,
            error.map(str::to_string),
        );

        self.store.save_trace(&trace).await;
        self.store.save_metric(&MetricRecord::from_trace(&trace)).await;

        if was_open {
            self.metrics.active_requests.dec();
        }
        self.observe(&trace);

        info!(
            trace_id = %trace_id,
            status = %trace.status,
            duration_seconds = duration_seconds,
            total_cost = trace.total_cost,
            "Trace ended"
        );
    }

    fn observe(&self, trace: &Trace) {
        let framework = trace.framework.as_str();
        let model = trace.model.as_str();

        self.metrics
            .requests_total
            .with_label_values(&[framework, model, &trace.vector_store, trace.status.as_str()])
            .inc();
        self.metrics
            .request_duration_seconds
            .with_label_values(&[framework, model, &trace.vector_store])
            .observe(trace.duration_seconds.unwrap_or(0.0));
        self.metrics
            .tokens_total
            .with_label_values(&[framework, model, "input"])
            .inc_by(trace.input_tokens);
        self.metrics
            .tokens_total
            .with_label_values(&[framework, model, "output"])
            .inc_by(trace.output_tokens);
        self.metrics
            .cost_usd_total
            .with_label_values(&[framework, model, "input"])
            .inc_by(trace.input_cost);
        self.metrics
            .cost_usd_total
            .with_label_values(&[framework, model, "output"])
            .inc_by(trace.output_cost);

        if trace.status == TraceStatus::Failed {
            self.metrics
                .errors_total
                .with_label_values(&[framework, model, "query_failure"])
                .inc();
        }
    }

    /// Load a trace by id.
    pub async fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        self.store.get_trace(trace_id).await
    }

    /// Windowed metrics aggregate from the store.
    pub async fn metrics_summary(&self, window_hours: u32) -> MetricsSummary {
        self.store.metrics_summary(window_hours).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_accounting::PricingTable;

    async fn lifecycle() -> TraceLifecycle {
        let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let accountant = Arc::new(CostAccountant::new(
            PricingTable::with_defaults(),
            "gpt-4o-mini",
        ));
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        TraceLifecycle::new(store, accountant, metrics)
    }

    fn request() -> QueryRequest {
        QueryRequest {
            framework: "langgraph".into(),
            model: "gpt-4o-mini".into(),
            vector_store: "faiss".into(),
            query: "list all running containers".into(),
        }
    }

    fn tokens_payload(tokens: u64) -> serde_json::Map<String, serde_json::Value> {
        let mut data = serde_json::Map::new();
        data.insert("tokens".into(), serde_json::json!(tokens));
        data
    }

    #[tokio::test]
    async fn start_persists_an_open_trace() {
        let lifecycle = lifecycle().await;
        let trace_id = lifecycle.start(&request()).await;

        let trace = lifecycle.get_trace(&trace_id).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Started);
        assert_eq!(trace.session_id, lifecycle.session_id());
        assert_eq!(lifecycle.metrics.active_requests.get(), 1);
    }

    #[tokio::test]
    async fn steps_accumulate_running_counters() {
        let lifecycle = lifecycle().await;
        let trace_id = lifecycle.start(&request()).await;

        lifecycle
            .add_step(&trace_id, "llm_call", tokens_payload(100))
            .await;
        lifecycle
            .add_step(&trace_id, "vector_search", serde_json::Map::new())
            .await;
        lifecycle
            .add_step(&trace_id, "formatting", serde_json::Map::new())
            .await;

        let trace = lifecycle.get_trace(&trace_id).await.unwrap();
        assert_eq!(trace.steps.len(), 3);
        assert_eq!(trace.metrics.tokens_used, 100);
        assert_eq!(trace.metrics.api_calls, 2);
    }

    #[tokio::test]
    async fn step_for_unknown_trace_is_dropped() {
        let lifecycle = lifecycle().await;
        lifecycle
            .add_step("no-such-trace", "llm_call", serde_json::Map::new())
            .await;
    }

    #[tokio::test]
    async fn end_prices_and_closes() {
        let lifecycle = lifecycle().await;
        let trace_id = lifecycle.start(&request()).await;
        lifecycle
            .end(&trace_id, TraceStatus::Completed, Some("the answer"), None)
            .await;

        let trace = lifecycle.get_trace(&trace_id).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Completed);
        assert_eq!(trace.response.as_deref(), Some("the answer"));
        // "list all running containers" is 27 chars → 7 tokens,
        // "the answer" is 10 chars → 3 tokens
        assert_eq!(trace.input_tokens, 7);
        assert_eq!(trace.output_tokens, 3);
        assert_eq!(trace.total_tokens, 10);
        assert_eq!(lifecycle.metrics.active_requests.get(), 0);

        let summary = lifecycle.metrics_summary(1).await;
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn failed_end_has_no_output_accounting() {
        let lifecycle = lifecycle().await;
        let trace_id = lifecycle.start(&request()).await;
        lifecycle
            .end(&trace_id, TraceStatus::Failed, None, Some("backend down"))
            .await;

        let trace = lifecycle.get_trace(&trace_id).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert_eq!(trace.output_tokens, 0);
        assert_eq!(trace.output_cost, 0.0);
        assert_eq!(trace.total_cost, trace.input_cost);
        assert_eq!(trace.error_message.as_deref(), Some("backend down"));
    }

    #[tokio::test]
    async fn non_terminal_end_is_ignored() {
        let lifecycle = lifecycle().await;
        let trace_id = lifecycle.start(&request()).await;
        lifecycle
            .end(&trace_id, TraceStatus::Started, None, None)
            .await;

        let trace = lifecycle.get_trace(&trace_id).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Started);
        assert_eq!(lifecycle.metrics.active_requests.get(), 1);
    }

    #[tokio::test]
    async fn double_end_keeps_gauge_at_zero() {
        let lifecycle = lifecycle().await;
        let trace_id = lifecycle.start(&request()).await;
        lifecycle
            .end(&trace_id, TraceStatus::Completed, Some("ok"), None)
            .await;
        lifecycle
            .end(&trace_id, TraceStatus::Failed, None, Some("late error"))
            .await;

        let trace = lifecycle.get_trace(&trace_id).await.unwrap();
        assert_eq!(trace.status, TraceStatus::Failed);
        assert_eq!(lifecycle.metrics.active_requests.get(), 0);
    }
}
