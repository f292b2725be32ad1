//! HTTP client for the collaborator service gateway.
//!
//! Every service is a `POST {base}/{path}` with the JSON request as body;
//! the JSON response body is returned as is. Paths come from
//! [`ServiceName::path`], e.g. `POST {base}/retrieval`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::invoke::{ServiceInvoker, ServiceName};
use crate::error::AgentError;

/// Service gateway client.
#[derive(Debug, Clone)]
pub struct HttpServiceInvoker {
    client: Client,
    base_url: String,
}

impl HttpServiceInvoker {
    /// Builds a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidRequest`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::InvalidRequest {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for a service.
    #[must_use]
    pub fn url(&self, service: ServiceName) -> String {
        format!("{}/{}", self.base_url, service.path())
    }
}

#[async_trait]
impl ServiceInvoker for HttpServiceInvoker {
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
        let url = self.url(service);
        debug!(%service, %url, "invoking service");

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::service(service, e))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AgentError::service(service, e))?;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        if !status.is_success() {
            let msg = body
                .get("error")
                .and_then(Value::as_str)
                .map_or_else(|| format!("HTTP {status}"), |e| format!("HTTP {status}: {e}"));
            return Err(AgentError::service(service, msg));
        }
        if body.is_null() && !bytes.is_empty() {
            return Err(AgentError::service(service, "response body is not JSON"));
        }
        Ok(body)
    }
}
