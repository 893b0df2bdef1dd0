//! MEV relay client.
//!
//! Relays are tried sequentially in configuration order under a wall-clock
//! budget. Successful bodies are cached per path; a path that fails on
//! every relay enters a negative cache so subsequent callers fail fast
//! instead of producing retry storms. [`RelayClient::get_from_all`] is the
//! merge-friendly variant that collects every 2xx body instead of stopping
//! at the first.

use crate::cache::TtlCache;
use crate::config::{sanitize_url, RelayConfig};
use crate::health::{DataSource, HealthStatus};
use bytes::Bytes;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    /// The path is in the negative cache; no network was touched.
    #[error("relay recently failed; backing off")]
    Backoff,

    /// Every relay failed; carries the most recent per-relay error.
    #[error("all {relays} relays failed, last error: {last}")]
    AllFailed { relays: usize, last: String },

    /// The budget elapsed before any relay produced an error or a body.
    #[error("all {0} relays failed or timed out")]
    AllTimedOut(usize),

    /// No recent slot could be extracted from delivered bidtraces.
    #[error("no recent slot available from relays")]
    NoSlot,

    #[error("client build failed: {0}")]
    Build(#[source] reqwest::Error),
}

/// Multi-relay bidtrace client with caching, negative caching, and a
/// per-call time budget.
pub struct RelayClient {
    bases: Vec<String>,
    http: reqwest::Client,
    cache: TtlCache<Bytes>,
    fail_cache: TtlCache<()>,
    budget: Duration,
    health: Arc<DataSource>,
}

impl RelayClient {
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let http = super::build_http_client(config.timeout).map_err(RelayError::Build)?;
        Ok(Self {
            bases: config.urls.clone(),
            http,
            cache: TtlCache::new(config.ok_ttl, Duration::ZERO),
            fail_cache: TtlCache::new(config.err_ttl, Duration::ZERO),
            budget: config.budget,
            health: Arc::new(DataSource::new("relay")),
        })
    }

    async fn fetch_one(&self, base: &str, path: &str) -> Result<Bytes, String> {
        let display = sanitize_url(base);
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| format!("request failed for {display}: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("non-2xx status {} from {display}", status.as_u16()));
        }
        let body = response.bytes().await.unwrap_or_default();
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(format!("empty response from {display}"));
        }
        Ok(body)
    }

    /// Fetches `path`, trying relays in order until one succeeds.
    ///
    /// # Errors
    ///
    /// [`RelayError::Backoff`] on a negative-cache hit (no network touched),
    /// otherwise an all-relays-failed error after the traversal.
    pub async fn get(&self, path: &str) -> Result<Bytes, RelayError> {
        if self.fail_cache.has(path) {
            let err = RelayError::Backoff;
            self.health.set_error(err.to_string());
            return Err(err);
        }
        if let Some(body) = self.cache.get(path) {
            return Ok(body);
        }

        let started = Instant::now();
        let mut last_err: Option<String> = None;
        for base in &self.bases {
            if started.elapsed() > self.budget {
                warn!(path, "relay budget exceeded");
                break;
            }
            match self.fetch_one(base, path).await {
                Ok(body) => {
                    self.cache.set(path, body.clone(), false);
                    self.health.set_success();
                    debug!(
                        relay = %sanitize_url(base),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "relay request succeeded"
                    );
                    return Ok(body);
                }
                Err(e) => last_err = Some(e),
            }
        }

        self.fail_cache.set(path, (), false);
        match last_err {
            Some(last) => {
                let err = RelayError::AllFailed {
                    relays: self.bases.len(),
                    last,
                };
                self.health.set_error(err.to_string());
                Err(err)
            }
            None => Err(RelayError::AllTimedOut(self.bases.len())),
        }
    }

    /// Fetches `path` from every relay, collecting each 2xx non-empty body.
    ///
    /// Used for merge/dedupe of overlapping bidtraces, so the negative
    /// cache deliberately does not apply; the time budget still does. The
    /// returned list may be empty.
    pub async fn get_from_all(&self, path: &str) -> Vec<Bytes> {
        let started = Instant::now();
        let mut bodies = Vec::new();
        for base in &self.bases {
            if started.elapsed() > self.budget {
                warn!(path, collected = bodies.len(), "relay budget exceeded");
                break;
            }
            match self.fetch_one(base, path).await {
                Ok(body) => bodies.push(body),
                Err(e) => debug!(error = %e, "relay skipped during fan-out"),
            }
        }
        if !bodies.is_empty() {
            self.health.set_success();
        }
        bodies
    }

    /// Returns the slot of the most recently delivered payload, for
    /// endpoints that require a slot filter.
    ///
    /// # Errors
    ///
    /// Any `get` failure, or [`RelayError::NoSlot`] when the response
    /// carries no usable entry.
    pub async fn recent_slot(&self) -> Result<String, RelayError> {
        let body = self
            .get("/relay/v1/data/bidtraces/proposer_payload_delivered?limit=1")
            .await?;
        let parsed: Value = serde_json::from_slice(&body).map_err(|_| RelayError::NoSlot)?;
        parsed
            .as_array()
            .and_then(|list| list.first())
            .and_then(|entry| entry.get("slot"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or(RelayError::NoSlot)
    }

    /// Performs one probe request and returns the resulting health status.
    pub async fn check_health(&self) -> HealthStatus {
        let _ = self
            .get("/relay/v1/data/bidtraces/proposer_payload_delivered?limit=1")
            .await;
        self.health.status()
    }

    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    /// Sanitized relay URLs for display.
    #[must_use]
    pub fn source_info(&self) -> Vec<String> {
        self.bases.iter().map(|b| sanitize_url(b)).collect()
    }
}
