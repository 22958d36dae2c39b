//! # Switchboard Core
//!
//! Domain types, traits, and error definitions for the Switchboard query
//! pipeline. This crate has **zero framework dependencies** — it defines the
//! data model (traces, steps, metric records, health records) and the adapter
//! contract that all other crates implement against.
//!
//! Backend adapters live outside this workspace; they only need to implement
//! the [`Adapter`] trait. Everything else depends inward on this crate.

pub mod adapter;
pub mod error;
pub mod health;
pub mod metric;
pub mod request;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use adapter::{Adapter, AdapterReply};
pub use error::{DispatchError, StoreError};
pub use health::{HealthInfo, HealthStatus};
pub use metric::MetricRecord;
pub use request::{DispatchOutcome, DispatchStatus, QueryRequest, ResultEnvelope};
pub use trace::{RunningMetrics, Step, Trace, TraceStatus};
