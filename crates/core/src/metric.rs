//! Denormalized metric snapshots.
//!
//! A [`MetricRecord`] is written exactly once, at trace end, so aggregate
//! queries (sums, averages, hourly buckets) stay cheap without re-parsing
//! trace blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trace::{Trace, TraceStatus};

/// A write-once snapshot of a completed (or failed) trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Snapshot timestamp.
    pub timestamp: DateTime<Utc>,
    /// The trace this row was derived from (referential linkage, not enforced).
    pub trace_id: String,
    pub framework: String,
    pub model: String,
    pub vector_store: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    /// End-to-end latency in milliseconds.
    pub latency_ms: f64,
    pub status: TraceStatus,
    pub error_message: Option<String>,
}

impl MetricRecord {
    /// Snapshot a trace at end time.
    pub fn from_trace(trace: &Trace) -> Self {
        Self {
            timestamp: Utc::now(),
            trace_id: trace.trace_id.clone(),
            framework: trace.framework.clone(),
            model: trace.model.clone(),
            vector_store: trace.vector_store.clone(),
            input_tokens: trace.input_tokens,
            output_tokens: trace.output_tokens,
            total_tokens: trace.total_tokens,
            input_cost: trace.input_cost,
            output_cost: trace.output_cost,
            total_cost: trace.total_cost,
            latency_ms: trace.duration_seconds.unwrap_or(0.0) * 1000.0,
            status: trace.status,
            error_message: trace.error_message.clone(),
        }
    }
}
