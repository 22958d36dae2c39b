//! Execution traces — the full record of one query's lifecycle.
//!
//! A [`Trace`] is created when a query enters the pipeline, accumulates
//! [`Step`]s as the call progresses, and is closed exactly once with a
//! terminal status. Steps are immutable once appended and their order is the
//! append order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::QueryRequest;

// ── Status ────────────────────────────────────────────────────────────────

/// Lifecycle status of a trace.
///
/// Transitions only `Started → Completed` or `Started → Failed`, never
/// backward. There is no cancellation state — cancellation is not observable
/// from this layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Started,
    Completed,
    Failed,
}

impl TraceStatus {
    /// The stable string form used in the database and in metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status ends the trace.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }

    /// Parse from the stored string form. Unknown strings map to `Started`
    /// so a corrupted row degrades instead of failing the read path.
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Started,
        }
    }
}

impl std::fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Step ──────────────────────────────────────────────────────────────────

/// One recorded sub-event within a trace.
///
/// Immutable once appended. The `data` map carries an arbitrary payload;
/// a numeric `tokens` entry is accumulated into the trace's running counters
/// by the lifecycle layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step name, e.g. `framework_initialization` or `llm_call`.
    pub name: String,
    /// When the step was recorded.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary step payload.
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Duration reported by the caller (taken from `data["duration"]`, 0 if absent).
    pub duration_seconds: f64,
}

impl Step {
    /// Create a step from a name and payload, stamping it with the current time.
    pub fn new(name: impl Into<String>, data: serde_json::Map<String, serde_json::Value>) -> Self {
        let duration_seconds = data
            .get("duration")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            data,
            duration_seconds,
        }
    }

    /// Tokens reported in the step payload, if any.
    pub fn tokens(&self) -> Option<u64> {
        self.data.get("tokens").and_then(serde_json::Value::as_u64)
    }

    /// Whether this step is an externally-visible operation that counts
    /// toward the trace's running api-call counter.
    pub fn counts_as_api_call(&self) -> bool {
        matches!(
            self.name.as_str(),
            "llm_call" | "vector_search" | "tool_execution"
        )
    }
}

// ── Running metrics ───────────────────────────────────────────────────────

/// Free-form running counters kept alongside a trace while it is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningMetrics {
    /// When the trace started (duration is computed against this at end).
    pub start_time: DateTime<Utc>,
    /// Tokens accumulated from step payloads so far.
    pub tokens_used: u64,
    /// Externally-visible operations (LLM calls, vector searches, tool
    /// executions) recorded so far.
    pub api_calls: u64,
}

impl RunningMetrics {
    fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            tokens_used: 0,
            api_calls: 0,
        }
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// One record per query execution, from start to terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique trace id (UUID v4).
    pub trace_id: String,
    /// The session this trace belongs to (one per lifecycle instance).
    pub session_id: String,
    /// When the trace started.
    pub started_at: DateTime<Utc>,
    /// When the trace ended (None while still open).
    pub ended_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: TraceStatus,
    /// The framework the query was dispatched to.
    pub framework: String,
    /// The model named in the request.
    pub model: String,
    /// The vector store named in the request.
    pub vector_store: String,
    /// The query text.
    pub query: String,
    /// The cleaned response text (set at end).
    pub response: Option<String>,
    /// Wall-clock duration in seconds (set at end).
    pub duration_seconds: Option<f64>,
    /// Input tokens (set at end).
    pub input_tokens: u64,
    /// Output tokens (set at end).
    pub output_tokens: u64,
    /// Always `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Input cost in USD, rounded to 6 decimal places.
    pub input_cost: f64,
    /// Output cost in USD, rounded to 6 decimal places.
    pub output_cost: f64,
    /// `round6(input_cost + output_cost)`.
    pub total_cost: f64,
    /// Error text for failed traces.
    pub error_message: Option<String>,
    /// Ordered step sequence (append order preserved).
    pub steps: Vec<Step>,
    /// Running counters while the trace is open.
    pub metrics: RunningMetrics,
}

impl Trace {
    /// Create a new trace for a request with a fresh id, `status = started`,
    /// zeroed running metrics, and no steps.
    pub fn new(request: &QueryRequest, session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            trace_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            started_at: now,
            ended_at: None,
            status: TraceStatus::Started,
            framework: request.framework.clone(),
            model: request.model.clone(),
            vector_store: request.vector_store.clone(),
            query: request.query.clone(),
            response: None,
            duration_seconds: None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
            error_message: None,
            steps: Vec::new(),
            metrics: RunningMetrics::new(now),
        }
    }

    /// Append a step, accumulating its reported tokens and bumping the
    /// api-call counter for externally-visible operation kinds.
    pub fn add_step(&mut self, step: Step) {
        if let Some(tokens) = step.tokens() {
            self.metrics.tokens_used += tokens;
        }
        if step.counts_as_api_call() {
            self.metrics.api_calls += 1;
        }
        self.steps.push(step);
    }

    /// Whether the trace has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Close the trace with a terminal status and its accounting results.
    ///
    /// A non-terminal `status` is ignored — the state machine never moves
    /// backward. Calling this again on an already-closed trace overwrites the
    /// terminal fields (last write wins).
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        &mut self,
        status: TraceStatus,
        response: Option<String>,
        duration_seconds: f64,
        input_tokens: u64,
        output_tokens: u64,
        input_cost: f64,
        output_cost: f64,
        error_message: Option<String>,
    ) {
        if !status.is_terminal() {
            return;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.response = response;
        self.duration_seconds = Some(duration_seconds);
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self.total_tokens = input_tokens + output_tokens;
        self.input_cost = input_cost;
        self.output_cost = output_cost;
        self.total_cost = round6(input_cost + output_cost);
        self.error_message = error_message;
    }
}

/// Round a cost to 6 decimal places (the precision stored everywhere).
pub fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QueryRequest {
        QueryRequest {
            framework: "langgraph".into(),
            model: "gpt-4o-mini".into(),
            vector_store: "faiss".into(),
            query: "list containers".into(),
        }
    }

    fn step_data(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn new_trace_is_started_and_empty() {
        let trace = Trace::new(&request(), "session-1");
        assert_eq!(trace.status, TraceStatus::Started);
        assert!(trace.steps.is_empty());
        assert_eq!(trace.metrics.tokens_used, 0);
        assert_eq!(trace.metrics.api_calls, 0);
        assert!(!trace.trace_id.is_empty());
    }

    #[test]
    fn add_step_preserves_order() {
        let mut trace = Trace::new(&request(), "s");
        trace.add_step(Step::new("framework_initialization", step_data(&[])));
        trace.add_step(Step::new("query_execution", step_data(&[])));
        assert_eq!(trace.steps[0].name, "framework_initialization");
        assert_eq!(trace.steps[1].name, "query_execution");
    }

    #[test]
    fn add_step_accumulates_tokens_and_api_calls() {
        let mut trace = Trace::new(&request(), "s");
        trace.add_step(Step::new(
            "llm_call",
            step_data(&[("tokens", serde_json::json!(120))]),
        ));
        trace.add_step(Step::new("vector_search", step_data(&[])));
        trace.add_step(Step::new("formatting", step_data(&[])));

        assert_eq!(trace.metrics.tokens_used, 120);
        assert_eq!(trace.metrics.api_calls, 2); // formatting is not an api call
    }

    #[test]
    fn finish_maintains_token_and_cost_invariants() {
        let mut trace = Trace::new(&request(), "s");
        trace.finish(
            TraceStatus::Completed,
            Some("ok".into()),
            1.5,
            100,
            50,
            0.000015,
            0.00003,
            None,
        );

        assert_eq!(trace.total_tokens, 150);
        assert!((trace.total_cost - round6(0.000015 + 0.00003)).abs() < 1e-12);
        assert!(trace.ended_at.is_some());
        assert!(trace.is_terminal());
    }

    #[test]
    fn finish_ignores_non_terminal_status() {
        let mut trace = Trace::new(&request(), "s");
        trace.finish(TraceStatus::Started, None, 0.0, 0, 0, 0.0, 0.0, None);
        assert_eq!(trace.status, TraceStatus::Started);
        assert!(trace.ended_at.is_none());
    }

    #[test]
    fn finish_twice_last_write_wins() {
        let mut trace = Trace::new(&request(), "s");
        trace.finish(
            TraceStatus::Completed,
            Some("first".into()),
            1.0,
            10,
            5,
            0.1,
            0.2,
            None,
        );
        trace.finish(
            TraceStatus::Failed,
            None,
            2.0,
            10,
            0,
            0.1,
            0.0,
            Some("boom".into()),
        );

        assert_eq!(trace.status, TraceStatus::Failed);
        assert_eq!(trace.error_message.as_deref(), Some("boom"));
        assert_eq!(trace.total_tokens, 10);
    }

    #[test]
    fn status_string_round_trip() {
        assert_eq!(TraceStatus::parse("completed"), TraceStatus::Completed);
        assert_eq!(TraceStatus::parse("failed"), TraceStatus::Failed);
        assert_eq!(TraceStatus::parse("started"), TraceStatus::Started);
        assert_eq!(TraceStatus::parse("garbage"), TraceStatus::Started);
        assert_eq!(TraceStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn step_duration_from_payload() {
        let step = Step::new(
            "query_execution",
            step_data(&[("duration", serde_json::json!(2.25))]),
        );
        assert!((step.duration_seconds - 2.25).abs() < f64::EPSILON);

        let step = Step::new("query_execution", step_data(&[]));
        assert_eq!(step.duration_seconds, 0.0);
    }

    #[test]
    fn trace_serialization_round_trip() {
        let mut trace = Trace::new(&request(), "session-42");
        trace.add_step(Step::new(
            "llm_call",
            step_data(&[("tokens", serde_json::json!(7))]),
        ));

        let json = serde_json::to_string(&trace).unwrap();
        let decoded: Trace = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.session_id, "session-42");
        assert_eq!(decoded.steps.len(), 1);
        assert_eq!(decoded.metrics.tokens_used, 7);
    }

    #[test]
    fn round6_rounds_half_up() {
        assert_eq!(round6(0.1234565), 0.123457);
        assert_eq!(round6(0.1234564), 0.123456);
        assert_eq!(round6(0.0), 0.0);
    }
}
