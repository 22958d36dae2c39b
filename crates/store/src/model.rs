//! Aggregate read models produced by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_core::HealthStatus;

/// Windowed aggregate over the metrics table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// The lookback window this summary covers, in hours.
    pub window_hours: u32,
    pub total_requests: u64,
    pub completed: u64,
    pub failed: u64,
    /// `completed / total_requests`, 0.0 when the window is empty.
    pub success_rate: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
    /// Per-framework breakdown, ordered by request count descending.
    pub frameworks: Vec<FrameworkSummary>,
}

impl MetricsSummary {
    pub fn empty(window_hours: u32) -> Self {
        Self {
            window_hours,
            total_requests: 0,
            completed: 0,
            failed: 0,
            success_rate: 0.0,
            total_tokens: 0,
            total_cost: 0.0,
            avg_latency_ms: 0.0,
            frameworks: Vec::new(),
        }
    }
}

/// One framework's slice of a [`MetricsSummary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkSummary {
    pub framework: String,
    pub requests: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Hour-bucketed request/token/cost series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    pub window_hours: u32,
    pub points: Vec<TimeSeriesPoint>,
}

impl TimeSeries {
    pub fn empty(window_hours: u32) -> Self {
        Self {
            window_hours,
            points: Vec::new(),
        }
    }
}

/// One hourly bucket. `hour` is the bucket label, `YYYY-MM-DD HH:00`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub hour: String,
    pub requests: u64,
    pub errors: u64,
    pub total_tokens: u64,
    /// Cost in USD, rounded to 4 decimal places.
    pub total_cost: f64,
    /// Average latency in milliseconds, rounded to 2 decimal places.
    pub avg_latency_ms: f64,
}

/// A lightweight row for the recent-activity view, read from the metrics
/// table rather than the full trace blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTrace {
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub framework: String,
    pub model: String,
    pub status: String,
    pub latency_ms: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub error_message: Option<String>,
}

/// One probe outcome from the health history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    pub status: HealthStatus,
    pub test_passed: bool,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}
