//! Error types for the Switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context has
//! its own error enum; errors are contained at the boundary of the component
//! that detects them and converted into structured result data rather than
//! crossing component boundaries as exceptions.

use thiserror::Error;

/// Persistence-layer failures.
///
/// Store reads degrade to empty/zero defaults and writes report a boolean
/// failure; this type exists for the internal plumbing that implements that
/// policy, it is never surfaced to the original caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Failures while loading or calling a framework adapter.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Framework not available: {0}")]
    NotAvailable(String),

    #[error("Adapter failed to load: {0}")]
    LoadFailed(String),

    #[error("Backend returned an error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}
