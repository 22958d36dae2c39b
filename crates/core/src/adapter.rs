//! The Adapter trait — the contract every framework backend implements.
//!
//! Adapters are interchangeable thin callers into whatever answers the query
//! (an HTTP service, an SDK, a local model). The pipeline only ever sees this
//! trait: dispatch calls `execute`, health checks call `probe`.

use async_trait::async_trait;

use crate::error::DispatchError;

/// A successful reply from a backend.
#[derive(Debug, Clone)]
pub struct AdapterReply {
    /// The raw answer text (cleaned later by the orchestrator).
    pub answer: String,
}

/// The external-collaborator contract: one named backend that can answer a
/// query. Implementations must be cheap to share (`Arc<dyn Adapter>`).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The framework name this adapter serves (e.g. "langgraph").
    fn name(&self) -> &str;

    /// Execute a query against the backend.
    async fn execute(&self, query: &str) -> Result<AdapterReply, DispatchError>;

    /// Lightweight health probe. Default sends a fixed probe query through
    /// `execute` and reports success.
    async fn probe(&self) -> Result<(), DispatchError> {
        self.execute("health check").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAdapter;

    #[async_trait]
    impl Adapter for EchoAdapter {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, query: &str) -> Result<AdapterReply, DispatchError> {
            Ok(AdapterReply {
                answer: query.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn default_probe_uses_execute() {
        let adapter = EchoAdapter;
        assert!(adapter.probe().await.is_ok());
    }

    #[tokio::test]
    async fn execute_returns_reply() {
        let adapter = EchoAdapter;
        let reply = adapter.execute("ping").await.unwrap();
        assert_eq!(reply.answer, "ping");
    }
}
