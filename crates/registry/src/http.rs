//! Generic HTTP adapter.
//!
//! The real per-framework agents run as separate services; this adapter is
//! the thin wire to them: POST `{query}` to the configured endpoint, read
//! back `{answer, status, error?}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use switchboard_core::{Adapter, AdapterReply, DispatchError};

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct BackendReply {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// An adapter that forwards queries to a framework service over HTTP.
pub struct HttpAdapter {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| DispatchError::LoadFailed(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, query: &str) -> Result<AdapterReply, DispatchError> {
        debug!(adapter = %self.name, endpoint = %self.endpoint, "Forwarding query");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&QueryBody { query })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(format!("adapter '{}' timed out: {e}", self.name))
                } else {
                    DispatchError::Network(format!("adapter '{}': {e}", self.name))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Backend(format!(
                "adapter '{}' returned HTTP {status}",
                self.name
            )));
        }

        let reply: BackendReply = response
            .json()
            .await
            .map_err(|e| DispatchError::Backend(format!("adapter '{}' bad reply: {e}", self.name)))?;

        if reply.status == "error" {
            return Err(DispatchError::Backend(
                reply
                    .error
                    .unwrap_or_else(|| format!("adapter '{}' reported an error", self.name)),
            ));
        }

        Ok(AdapterReply {
            answer: reply.answer,
        })
    }
}
