//! Upstream clients: execution layer (JSON-RPC), consensus layer (beacon
//! REST), and MEV relays (bidtrace REST).
//!
//! Each client owns its own reqwest client, cache(s), and
//! [`crate::health::DataSource`]; composition is always by return value.

pub mod beacon;
pub mod el;
pub mod relay;

use std::time::Duration;

/// Builds the HTTP client every upstream uses. Kept in one place so all
/// clients share pool and redirect behavior.
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("blockfuse/0.1.0")
        .build()
}
