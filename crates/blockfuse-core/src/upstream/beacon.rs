//! Consensus-layer (beacon chain) REST client.
//!
//! GET-only, with one dual-TTL cache of `(body, status)` tuples: 2xx
//! responses live for the ok TTL, non-2xx for the shorter error TTL so a
//! rate-limited path is retried sooner.

use crate::cache::TtlCache;
use crate::config::{sanitize_url, BeaconConfig};
use crate::health::{DataSource, HealthStatus};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// A cached beacon response: raw body plus HTTP status.
#[derive(Debug, Clone)]
pub struct BeaconResponse {
    pub body: Bytes,
    pub status: u16,
}

impl BeaconResponse {
    /// True for any 2xx status.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum BeaconError {
    /// Network failure before any HTTP status was produced. These are not
    /// cached; the next caller retries immediately.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("client build failed: {0}")]
    Build(#[source] reqwest::Error),
}

/// Beacon REST client with response caching and health tracking.
pub struct BeaconClient {
    base_url: String,
    http: reqwest::Client,
    cache: TtlCache<BeaconResponse>,
    health: Arc<DataSource>,
}

impl BeaconClient {
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new(config: &BeaconConfig) -> Result<Self, BeaconError> {
        let http = super::build_http_client(config.timeout).map_err(BeaconError::Build)?;
        Ok(Self {
            base_url: config.base_url.clone(),
            http,
            cache: TtlCache::new(config.ok_ttl, config.err_ttl),
            health: Arc::new(DataSource::new("beacon")),
        })
    }

    /// Fetches `path` (absolute, starting with `/`) from the beacon API.
    ///
    /// Non-2xx responses are returned to the caller, not converted to
    /// errors; only transport failures error out.
    ///
    /// # Errors
    ///
    /// [`BeaconError::Transport`] when the request never produced a status.
    pub async fn get(&self, path: &str) -> Result<BeaconResponse, BeaconError> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached);
        }
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self.http.get(&url).send().await.map_err(|e| {
            self.health.set_error(e.to_string());
            e
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();
        let value = BeaconResponse {
            body: body.clone(),
            status,
        };
        let is_err = !value.is_ok();
        self.cache.set(path, value, is_err);
        if is_err {
            self.health.set_error(format!("HTTP {status}"));
        } else {
            self.health.set_success();
        }
        Ok(BeaconResponse { body, status })
    }

    /// Convenience wrapper: the parsed JSON body of a 2xx response, or
    /// `None` for any failure. Used where enrichment is best-effort.
    pub async fn get_json(&self, path: &str) -> Option<Value> {
        let response = self.get(path).await.ok()?;
        if !response.is_ok() {
            return None;
        }
        serde_json::from_slice(&response.body).ok()
    }

    /// Performs one probe request and returns the resulting health status.
    pub async fn check_health(&self) -> HealthStatus {
        let _ = self.get("/eth/v1/beacon/headers?limit=1").await;
        self.health.status()
    }

    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Sanitized base URL for display.
    #[must_use]
    pub fn source_info(&self) -> String {
        sanitize_url(&self.base_url)
    }
}
