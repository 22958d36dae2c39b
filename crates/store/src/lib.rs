//! Durable persistence for traces, metric snapshots, sessions, and health
//! history.
//!
//! The store is deliberately forgiving at its boundary: reads degrade to
//! empty defaults and writes report success as a boolean, so a broken disk
//! never takes the query path down with it. Failures are logged, not raised.

mod model;
mod sqlite;

pub use model::{
    FrameworkSummary, HealthSample, MetricsSummary, RecentTrace, TimeSeries, TimeSeriesPoint,
};
pub use sqlite::SqliteStore;
