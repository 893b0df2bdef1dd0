//! Environment-driven configuration.
//!
//! Every knob is read from the process environment, optionally seeded from a
//! `.env`-style file loaded at startup. Numeric variables are validated
//! against a documented range; out-of-range or unparseable values fall back
//! to the compiled default rather than failing startup. The two MEV scan
//! knobs are the exception: they clamp into range instead of falling back,
//! so `SANDWICH_MAX_TX=0` still yields a usable scanner.
//!
//! This module also owns the small shared utilities that almost every other
//! module needs: hex parsing and URL sanitization for display.

use alloy_primitives::U256;
use std::time::Duration;
use url::Url;

/// Loads KEY=VALUE pairs from a `.env`-style file into the environment.
///
/// Blank lines and lines starting with `#` are ignored. A missing file is
/// not an error; callers invoke this unconditionally before reading any
/// configuration.
pub fn load_env_file(path: &str) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            std::env::set_var(key.trim(), value.trim());
        }
    }
}

/// Returns the environment variable `key`, or `fallback` if unset or empty.
#[must_use]
pub fn env_or(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

/// Reads a numeric env var constrained to `min..=max`; anything else
/// (unset, unparseable, out of range) yields `default`.
///
/// Idempotent by construction: feeding the result back through the same
/// range returns the same value.
fn env_u64_in(key: &str, min: u64, max: u64, default: u64) -> u64 {
    match env_or(key, "").parse::<u64>() {
        Ok(n) if n >= min && n <= max => n,
        _ => default,
    }
}

/// Reads a numeric env var and clamps it into `min..=max`; unset or
/// unparseable yields `default`.
fn env_u64_clamped(key: &str, min: u64, max: u64, default: u64) -> u64 {
    match env_or(key, "").parse::<u64>() {
        Ok(n) => n.clamp(min, max),
        _ => default,
    }
}

/// Parses a `0x`-prefixed hex string into a `u64`.
#[must_use]
pub fn parse_hex_u64(h: &str) -> Option<u64> {
    u64::from_str_radix(h.trim_start_matches("0x"), 16).ok()
}

/// Parses a `0x`-prefixed hex string into a [`U256`].
#[must_use]
pub fn parse_hex_u256(h: &str) -> Option<U256> {
    U256::from_str_radix(h.trim_start_matches("0x"), 16).ok()
}

/// Removes credentials and API keys from a URL so it is safe to display.
///
/// Strips userinfo, drops query parameters whose name contains `key`,
/// `token` or `secret`, and redacts provider-identifier path segments
/// (`/v2/<id>`, `/v3/<id>`).
#[must_use]
pub fn sanitize_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let Ok(parsed) = Url::parse(raw) else {
        return redact_api_key(raw);
    };
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            !(k.contains("key") || k.contains("token") || k.contains("secret"))
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut out = format!("{}://", parsed.scheme());
    if let Some(host) = parsed.host_str() {
        out.push_str(host);
    }
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(&redact_api_key(parsed.path()));
    if !kept.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    out
}

/// Redacts common provider key patterns (`/v2/<id>`, `/v3/<id>`) from a
/// string, dropping everything after the redaction marker.
#[must_use]
pub fn redact_api_key(s: &str) -> String {
    let replaced = s
        .replace("/v3/", "/v3/[REDACTED]")
        .replace("/v2/", "/v2/[REDACTED]");
    match replaced.split_once("/[REDACTED]") {
        Some((head, _)) => format!("{head}/[REDACTED]"),
        None => replaced,
    }
}

const DEFAULT_EL_PROVIDER: &str = "https://eth-mainnet.g.alchemy.com/v2/demo";

const DEFAULT_RELAYS: &str = "https://0xa15b5e1a7e51010198401aab7e@aestus.live,\
https://0xa7ab7e550200401aab7e@agnostic-relay.net,\
https://0x8b5d2e1a7e51010198401aab7e@bloxroute.max-profit.blxrbdn.com,\
https://0xb0b07e550200401aab7e@bloxroute.regulated.blxrbdn.com,\
https://0xac6e7e51010198401aab7e@boost-relay.flashbots.net,\
https://0x98650e550200401aab7e@mainnet-relay.securerpc.com,\
https://0xa1559e51010198401aab7e@relay.ultrasound.money,\
https://0x8c7d3e550200401aab7e@relay.wenmerge.com,\
https://0x8c4edc51010198401aab7e@titanrelay.xyz";

/// Execution-layer client settings.
#[derive(Debug, Clone)]
pub struct ElConfig {
    /// Ordered provider URLs. Never empty; a public default is substituted
    /// when nothing is configured.
    pub providers: Vec<String>,
    /// Informational WebSocket URL, surfaced in `sources` but never dialed.
    pub ws_url: String,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

/// Consensus-layer (beacon) client settings.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub ok_ttl: Duration,
    pub err_ttl: Duration,
}

/// MEV relay client settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Ordered relay base URLs. Never empty.
    pub urls: Vec<String>,
    pub timeout: Duration,
    /// Wall-clock budget for one call across all relays.
    pub budget: Duration,
    pub ok_ttl: Duration,
    /// Negative-cache TTL for paths that failed on every relay.
    pub err_ttl: Duration,
}

/// Mempool poller settings.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// When set, the poller is replaced by a fixed mock snapshot.
    pub disabled: bool,
}

/// MEV block scan settings.
#[derive(Debug, Clone)]
pub struct MevConfig {
    /// Upper bound on transactions scanned per block, clamped to 10..=1000.
    pub max_tx: usize,
    /// Concurrent receipt fetches, clamped to 1..=50.
    pub workers: usize,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address; a bare `:port` is interpreted as all interfaces.
    pub listen_addr: String,
    /// Allowed CORS origin.
    pub cors_origin: String,
}

/// Root configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub el: ElConfig,
    pub beacon: BeaconConfig,
    pub relay: RelayConfig,
    pub mempool: MempoolConfig,
    pub mev: MevConfig,
    pub snapshot_ttl: Duration,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Reads the full configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        // Numbered providers take precedence over the single-URL form.
        let mut providers: Vec<String> = (1..=10)
            .map(|i| env_or(&format!("RPC_HTTP_URL{i}"), ""))
            .filter(|u| !u.is_empty())
            .collect();
        if providers.is_empty() {
            let single = env_or("RPC_HTTP_URL", "");
            if !single.is_empty() {
                providers.push(single);
            }
        }
        if providers.is_empty() {
            providers.push(DEFAULT_EL_PROVIDER.to_string());
        }

        let relay_urls: Vec<String> = env_or("RELAY_URLS", DEFAULT_RELAYS)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let relay_urls = if relay_urls.is_empty() {
            vec!["https://boost-relay.flashbots.net".to_string()]
        } else {
            relay_urls
        };

        let upstream_timeout =
            Duration::from_secs(env_u64_in("UPSTREAM_TIMEOUT_SECONDS", 1, 60, 3));
        let ok_ttl = Duration::from_secs(env_u64_in("CACHE_TTL_SECONDS", 1, 300, 20));
        let err_ttl = Duration::from_secs(env_u64_in("ERROR_CACHE_TTL_SECONDS", 1, 120, 10));

        // SNAPSHOT_TTL_SECONDS wins; CACHE_TTL_SECONDS is the fallback with a
        // wider allowed range than the client caches use.
        let snapshot_ttl_secs = match env_or("SNAPSHOT_TTL_SECONDS", "").parse::<u64>() {
            Ok(n) if (1..=600).contains(&n) => n,
            _ => match env_or("CACHE_TTL_SECONDS", "").parse::<u64>() {
                Ok(n) if (1..=600).contains(&n) => n,
                _ => 30,
            },
        };

        let disabled = matches!(
            env_or("MEMPOOL_DISABLE", "").to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );

        Self {
            el: ElConfig {
                providers,
                ws_url: env_or("RPC_WS_URL", ""),
                timeout: Duration::from_secs(env_u64_in("RPC_TIMEOUT_SECONDS", 1, 60, 5)),
            },
            beacon: BeaconConfig {
                base_url: env_or("BEACON_API_URL", "https://beacon.prylabs.net"),
                timeout: upstream_timeout,
                ok_ttl,
                err_ttl,
            },
            relay: RelayConfig {
                urls: relay_urls,
                timeout: upstream_timeout,
                budget: Duration::from_millis(env_u64_in("RELAY_BUDGET_MS", 101, 20_000, 2_500)),
                ok_ttl,
                err_ttl,
            },
            mempool: MempoolConfig { disabled },
            mev: MevConfig {
                max_tx: env_u64_clamped("SANDWICH_MAX_TX", 10, 1_000, 400) as usize,
                workers: env_u64_clamped("SANDWICH_WORKERS", 1, 50, 10) as usize,
            },
            snapshot_ttl: Duration::from_secs(snapshot_ttl_secs),
            server: ServerConfig {
                listen_addr: env_or("GOAPI_ADDR", &format!(":{}", env_or("PORT", "8080"))),
                cors_origin: env_or("GOAPI_ORIGIN", "http://localhost:3000"),
            },
        }
    }
}
