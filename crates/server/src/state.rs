//! Composition root: every client and feature component is constructed
//! once here and shared with handlers through `Arc<AppState>`.

use anyhow::{Context, Result};
use blockfuse_core::cache::TtlCache;
use blockfuse_core::config::AppConfig;
use blockfuse_core::mempool::MempoolMonitor;
use blockfuse_core::mev::MevAnalyzer;
use blockfuse_core::snapshot::SnapshotBuilder;
use blockfuse_core::track::LifecycleTracker;
use blockfuse_core::upstream::beacon::BeaconClient;
use blockfuse_core::upstream::el::ElClient;
use blockfuse_core::upstream::relay::RelayClient;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub el: Arc<ElClient>,
    pub beacon: Arc<BeaconClient>,
    pub relay: Arc<RelayClient>,
    pub mempool: Arc<MempoolMonitor>,
    pub tracker: LifecycleTracker,
    pub mev: Arc<MevAnalyzer>,
    pub snapshot: SnapshotBuilder,
    /// Serialized snapshot envelopes, keyed by the request parameters.
    pub snapshot_cache: TtlCache<Bytes>,
}

impl AppState {
    pub fn build(config: &AppConfig) -> Result<Arc<Self>> {
        let el = Arc::new(ElClient::new(&config.el).context("el client")?);
        let beacon = Arc::new(BeaconClient::new(&config.beacon).context("beacon client")?);
        let relay = Arc::new(RelayClient::new(&config.relay).context("relay client")?);
        let mempool = Arc::new(MempoolMonitor::new(Arc::clone(&el), &config.mempool));
        let mev = Arc::new(MevAnalyzer::new(Arc::clone(&el), &config.mev));
        let tracker =
            LifecycleTracker::new(Arc::clone(&el), Arc::clone(&beacon), Arc::clone(&relay));
        let snapshot = SnapshotBuilder::new(
            Arc::clone(&mempool),
            Arc::clone(&relay),
            Arc::clone(&beacon),
            Arc::clone(&el),
            Arc::clone(&mev),
        );
        Ok(Arc::new(Self {
            el,
            beacon,
            relay,
            mempool,
            tracker,
            mev,
            snapshot,
            snapshot_cache: TtlCache::new(config.snapshot_ttl, Duration::ZERO),
        }))
    }
}
