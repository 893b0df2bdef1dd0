//! Execution-layer JSON-RPC client with a multi-provider race.
//!
//! With one configured provider a call is a plain POST. With more, every
//! provider is raced concurrently under a shared deadline and the first
//! response carrying a non-null `result` wins; the remaining in-flight
//! requests are cancelled by drop. Callers must not depend on which
//! provider served them.

use crate::config::{sanitize_url, ElConfig};
use crate::health::{DataSource, HealthStatus};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Shared deadline for the multi-provider race.
const RACE_DEADLINE: Duration = Duration::from_secs(5);

/// Errors surfaced by [`ElClient::call`].
#[derive(Debug, Error)]
pub enum ElError {
    /// Network or transport failure from the HTTP layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body was not valid JSON.
    #[error("invalid response: {0}")]
    Parse(#[from] serde_json::Error),

    /// JSON-RPC envelope carried an `error` object.
    #[error("{message}")]
    Rpc { code: i64, message: String },

    /// Non-standard rate-limit style body: a bare `{code, message}` with no
    /// JSON-RPC envelope (seen from some hosted providers).
    #[error("rpc error {code}: {message}")]
    BareRpc { code: i64, message: String },

    /// Envelope was well-formed but `result` was null.
    #[error("rpc returned null result")]
    NullResult,

    /// Every provider in the race failed or the deadline elapsed.
    #[error("all RPC providers failed or timed out")]
    AllProvidersFailed,

    /// The underlying HTTP client could not be constructed.
    #[error("client build failed: {0}")]
    Build(#[source] reqwest::Error),
}

/// Execution-layer JSON-RPC client.
pub struct ElClient {
    providers: Vec<String>,
    ws_url: String,
    http: reqwest::Client,
    health: Arc<DataSource>,
}

impl ElClient {
    /// Creates a client over the configured provider list.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new(config: &ElConfig) -> Result<Self, ElError> {
        let http = super::build_http_client(config.timeout).map_err(ElError::Build)?;
        Ok(Self {
            providers: config.providers.clone(),
            ws_url: config.ws_url.clone(),
            http,
            health: Arc::new(DataSource::new("rpc")),
        })
    }

    async fn call_one(&self, url: &str, method: &str, params: &Value) -> Result<Value, ElError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self.http.post(url).json(&payload).send().await?;
        let body = response.bytes().await?;
        let parsed: Value = serde_json::from_slice(&body)?;

        if let Some(err) = parsed.get("error").filter(|e| !e.is_null()) {
            return Err(ElError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        match parsed.get("result") {
            Some(result) if !result.is_null() => Ok(result.clone()),
            _ => {
                let code = parsed.get("code").and_then(Value::as_i64).unwrap_or(0);
                if code != 0 {
                    return Err(ElError::BareRpc {
                        code,
                        message: parsed
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                Err(ElError::NullResult)
            }
        }
    }

    /// Invokes a JSON-RPC method, racing all providers.
    ///
    /// # Errors
    ///
    /// With one provider, the provider's own error is surfaced. With more,
    /// the most recent per-leg error is surfaced once every leg has failed,
    /// or [`ElError::AllProvidersFailed`] if the deadline fires first.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ElError> {
        if self.providers.len() == 1 {
            return match self.call_one(&self.providers[0], method, &params).await {
                Ok(result) => {
                    self.health.set_success();
                    Ok(result)
                }
                Err(e) => {
                    self.health.set_error(e.to_string());
                    Err(e)
                }
            };
        }

        let params = &params;
        let mut legs: FuturesUnordered<_> = self
            .providers
            .iter()
            .map(|provider| async move {
                let result = self.call_one(provider, method, params).await;
                (provider.as_str(), result)
            })
            .collect();

        let race = async {
            let mut last_err = None;
            while let Some((provider, result)) = legs.next().await {
                match result {
                    Ok(value) => {
                        debug!(provider = %sanitize_url(provider), method, "rpc race won");
                        return Ok(value);
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            Err(last_err.unwrap_or(ElError::AllProvidersFailed))
        };

        match tokio::time::timeout(RACE_DEADLINE, race).await {
            Ok(Ok(value)) => {
                self.health.set_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(method, error = %e, "all rpc providers failed");
                self.health.set_error(e.to_string());
                Err(e)
            }
            Err(_) => {
                let e = ElError::AllProvidersFailed;
                warn!(method, "rpc race deadline exceeded");
                self.health.set_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Performs one probe call and returns the resulting health status.
    pub async fn check_health(&self) -> HealthStatus {
        let _ = self.call("eth_blockNumber", json!([])).await;
        self.health.status()
    }

    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Sanitized provider URLs for display: the primary with a `(+N more)`
    /// suffix when redundant providers are configured, plus the WS URL.
    #[must_use]
    pub fn source_info(&self) -> (String, String) {
        let mut primary = String::new();
        if let Some(first) = self.providers.first() {
            primary = sanitize_url(first);
            if self.providers.len() > 1 {
                primary = format!("{primary} (+{} more)", self.providers.len() - 1);
            }
        }
        (primary, sanitize_url(&self.ws_url))
    }

    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
