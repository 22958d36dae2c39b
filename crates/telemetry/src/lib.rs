//! Trace lifecycle management and Prometheus metrics.
//!
//! [`TraceLifecycle`] drives a trace from start through steps to its terminal
//! status, persisting through the store and pricing through the accountant.
//! Every operation here swallows internal failures after logging them: the
//! query path must never die because observability did.

mod lifecycle;
mod metrics;

pub use lifecycle::TraceLifecycle;
pub use metrics::MetricsRegistry;
