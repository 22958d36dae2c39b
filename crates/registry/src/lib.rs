//! Framework registry — loads, looks up, and dispatches to backend adapters.
//!
//! Loading is isolated per entry: one broken adapter never blocks the rest,
//! it is simply recorded as failed and reported as such. Dispatch never
//! raises; failures come back as structured outcomes.

mod http;
mod registry;

pub use http::HttpAdapter;
pub use registry::{builtin_catalog, AdapterBuilder, FrameworkRegistry, FrameworkStatus, LoadState};
