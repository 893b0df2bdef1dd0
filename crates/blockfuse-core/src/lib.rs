//! # Blockfuse Core
//!
//! Core library for the blockfuse read-only Ethereum aggregation service.
//! It fuses three independent upstream families into a single view:
//!
//! - **[`upstream::el`]**: execution-layer JSON-RPC client that races all
//!   configured providers and returns the first successful response.
//!
//! - **[`upstream::beacon`]**: consensus-layer REST client with dual-TTL
//!   response caching.
//!
//! - **[`upstream::relay`]**: MEV relay fan-out with a wall-clock budget and
//!   per-path negative caching.
//!
//! On top of the clients sit the feature components:
//!
//! - **[`mempool`]**: background pending-block poller with derived metrics.
//! - **[`track`]**: full transaction lifecycle resolution (EL + CL + relay).
//! - **[`decode`]**: heuristic transaction-input decoding.
//! - **[`mev`]**: block-level MEV pattern detection (sandwiches, arbitrage,
//!   liquidations, JIT liquidity).
//! - **[`snapshot`]**: budgeted parallel composition of everything above.
//!
//! Shared infrastructure lives in [`cache`] (generic TTL cache), [`health`]
//! (per-source health accounting and aggregation), and [`config`]
//! (environment-driven configuration, hex parsing, URL redaction).
//!
//! All state is process-local; nothing persists across restarts. Clients are
//! constructed once from an [`config::AppConfig`] at startup and shared via
//! `Arc`; there are no process globals.

pub mod cache;
pub mod config;
pub mod decode;
pub mod health;
pub mod mempool;
pub mod mev;
pub mod snapshot;
pub mod track;
pub mod upstream;
