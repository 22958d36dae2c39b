//! Request and result types that cross the pipeline boundary.

use serde::{Deserialize, Serialize};

/// What the caller asks the pipeline to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The named backend to dispatch to (matched case-insensitively).
    pub framework: String,
    /// The model, used for pricing and labels.
    pub model: String,
    /// The vector store, recorded for labels only.
    pub vector_store: String,
    /// The natural-language query.
    pub query: String,
}

/// Dispatch result status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    Error,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured result of one dispatch.
///
/// Dispatch never raises: failures surface here as `status = error` with the
/// error text captured. `duration_seconds` covers the adapter call only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub answer: String,
    pub status: DispatchStatus,
    pub duration_seconds: f64,
    pub framework: String,
    pub error: Option<String>,
}

impl DispatchOutcome {
    /// A structured error outcome for a framework that could not serve the call.
    pub fn error(
        framework: impl Into<String>,
        answer: impl Into<String>,
        error: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            answer: answer.into(),
            status: DispatchStatus::Error,
            duration_seconds,
            framework: framework.into(),
            error: Some(error.into()),
        }
    }
}

/// The envelope returned to the original caller.
///
/// Always well-formed: a failed query carries `status = error` and a
/// human-readable `answer`, never a raw error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub answer: String,
    pub trace_id: String,
    pub framework: String,
    pub model: String,
    pub vector_store: String,
    pub duration_seconds: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub status: DispatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_status_display() {
        assert_eq!(DispatchStatus::Success.to_string(), "success");
        assert_eq!(DispatchStatus::Error.to_string(), "error");
    }

    #[test]
    fn error_outcome_is_structured() {
        let outcome = DispatchOutcome::error("x", "Framework 'x' not available", "not loaded", 0.0);
        assert_eq!(outcome.status, DispatchStatus::Error);
        assert_eq!(outcome.framework, "x");
        assert!(outcome.error.is_some());
    }

    #[test]
    fn envelope_serialization_skips_absent_error() {
        let envelope = ResultEnvelope {
            answer: "ok".into(),
            trace_id: "t".into(),
            framework: "f".into(),
            model: "m".into(),
            vector_store: "v".into(),
            duration_seconds: 0.1,
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
            status: DispatchStatus::Success,
            error: None,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"success\""));
    }
}
