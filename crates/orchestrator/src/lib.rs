//! The orchestrator: one query in, one envelope out.
//!
//! `execute_query` runs the full pipeline: open a trace, dispatch to the
//! framework, clean the response, account tokens and cost, close the trace,
//! and hand the caller a well-formed envelope. It never panics and never
//! returns a raw error; failures become `status = error` envelopes.

mod clean;
mod orchestrator;

pub use clean::clean_response;
pub use orchestrator::{bootstrap, BootstrapError, Orchestrator};
