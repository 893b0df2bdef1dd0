//! Mempool monitoring via periodic polling of the execution layer.
//!
//! One background task fetches the pending block every five seconds and
//! replaces a process-wide snapshot under a read/write lock. Readers always
//! see a complete snapshot; a failed or empty poll never clears the
//! previous one.

use crate::config::{parse_hex_u256, parse_hex_u64, MempoolConfig};
use crate::health::{DataSource, HealthStatus};
use crate::upstream::el::ElClient;
use alloy_primitives::U256;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Gas price above which a pending transaction counts as high priority
/// (strictly greater than 50 gwei).
const HIGH_PRIORITY_WEI: u64 = 50_000_000_000;

/// A simplified view of a transaction before it is included in a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTx {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub gas_price: Option<String>,
    pub gas: Option<String>,
    pub nonce: String,
    pub input: String,
    /// Unix timestamp of the poll tick that observed this transaction.
    pub timestamp: i64,
}

/// Aggregated stats over one snapshot, recomputed from scratch each tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolMetrics {
    pub total_gas_requested: u64,
    pub total_value_wei: String,
    pub avg_gas_price: f64,
    pub high_priority_count: u32,
}

/// The current mempool snapshot. Exactly one exists per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolData {
    pub pending_txs: Vec<PendingTx>,
    pub count: usize,
    pub last_update: i64,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MempoolMetrics>,
}

impl Default for MempoolData {
    fn default() -> Self {
        Self {
            pending_txs: Vec::new(),
            count: 0,
            last_update: 0,
            source: "polling".to_string(),
            metrics: None,
        }
    }
}

/// Derives [`MempoolMetrics`] from a pending-transaction list.
///
/// Only legacy `gasPrice` contributes to the average; EIP-1559 fee fields
/// are deliberately not averaged here.
#[must_use]
pub fn compute_metrics(txs: &[PendingTx]) -> Option<MempoolMetrics> {
    if txs.is_empty() {
        return None;
    }
    let mut metrics = MempoolMetrics::default();
    let mut total_gas_price: u64 = 0;
    let mut gas_price_count: u64 = 0;
    let mut total_value = U256::ZERO;

    for tx in txs {
        if let Some(gas) = tx.gas.as_deref().and_then(parse_hex_u64) {
            metrics.total_gas_requested = metrics.total_gas_requested.saturating_add(gas);
        }
        if !tx.value.is_empty() && tx.value != "0x" && tx.value != "0x0" {
            if let Some(value) = parse_hex_u256(&tx.value) {
                total_value = total_value.saturating_add(value);
            }
        }
        let gas_price = tx
            .gas_price
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(parse_hex_u64)
            .unwrap_or(0);
        if gas_price > 0 {
            total_gas_price = total_gas_price.saturating_add(gas_price);
            gas_price_count += 1;
            if gas_price > HIGH_PRIORITY_WEI {
                metrics.high_priority_count += 1;
            }
        }
    }

    metrics.total_value_wei = format!("0x{total_value:x}");
    if gas_price_count > 0 {
        metrics.avg_gas_price = (total_gas_price / gas_price_count) as f64 / 1e9;
    }
    Some(metrics)
}

/// Background mempool poller and snapshot owner.
pub struct MempoolMonitor {
    el: Arc<ElClient>,
    data: RwLock<MempoolData>,
    health: Arc<DataSource>,
    disabled: bool,
}

impl MempoolMonitor {
    #[must_use]
    pub fn new(el: Arc<ElClient>, config: &MempoolConfig) -> Self {
        Self {
            el,
            data: RwLock::new(MempoolData::default()),
            health: Arc::new(DataSource::new("mempool")),
            disabled: config.disabled,
        }
    }

    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MempoolData {
        self.data.read().clone()
    }

    /// Starts monitoring. Disabled mode installs a fixed mock snapshot and
    /// never spawns the poll loop.
    pub fn start(self: Arc<Self>) {
        if self.disabled {
            info!("mempool polling disabled, installing mock snapshot");
            self.install_mock();
            return;
        }
        info!("mempool: starting pending-block polling");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                self.poll_once().await;
            }
        });
    }

    fn install_mock(&self) {
        let now = Utc::now().timestamp();
        let txs: Vec<PendingTx> = (0..10)
            .map(|i| PendingTx {
                hash: format!("0x{:064x}", i + 1),
                from: format!("0x{:040x}", i * 1_000),
                to: Some(format!("0x{:040x}", i * 2_000)),
                value: format!("0x{:x}", (i as u128 + 1) * 1_000_000_000_000_000_000),
                gas_price: None,
                gas: None,
                nonce: String::new(),
                input: String::new(),
                timestamp: now - i64::from(i) * 10,
            })
            .collect();
        let mut data = self.data.write();
        *data = MempoolData {
            count: txs.len(),
            pending_txs: txs,
            last_update: now,
            source: "disabled".to_string(),
            metrics: None,
        };
    }

    /// Runs one poll tick: fetch the pending block, derive metrics, and
    /// atomically replace the snapshot. Failures and empty blocks leave the
    /// previous snapshot intact.
    pub async fn poll_once(&self) {
        let raw = match self
            .el
            .call("eth_getBlockByNumber", json!(["pending", true]))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "mempool: pending block fetch failed");
                self.health.set_error(e.to_string());
                return;
            }
        };
        let Some(transactions) = raw.get("transactions").and_then(Value::as_array) else {
            warn!("mempool: pending block had no transaction list");
            return;
        };
        if transactions.is_empty() {
            return;
        }

        let now = Utc::now().timestamp();
        let str_field = |tx: &Value, key: &str| {
            tx.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let opt_field = |tx: &Value, key: &str| {
            tx.get(key).and_then(Value::as_str).map(String::from)
        };
        let pending: Vec<PendingTx> = transactions
            .iter()
            .map(|tx| PendingTx {
                hash: str_field(tx, "hash"),
                from: str_field(tx, "from"),
                to: opt_field(tx, "to"),
                value: str_field(tx, "value"),
                gas_price: opt_field(tx, "gasPrice"),
                gas: opt_field(tx, "gas"),
                nonce: str_field(tx, "nonce"),
                input: str_field(tx, "input"),
                timestamp: now,
            })
            .collect();

        let metrics = compute_metrics(&pending);
        let count = pending.len();
        {
            let mut data = self.data.write();
            *data = MempoolData {
                count,
                pending_txs: pending,
                last_update: now,
                source: "polling".to_string(),
                metrics: metrics.clone(),
            };
        }
        self.health.set_success();
        info!(
            count,
            avg_gas_gwei = metrics.as_ref().map_or(0.0, |m| m.avg_gas_price),
            "mempool: snapshot updated"
        );
    }

    /// Health based on recent data: a populated snapshot (or disabled mock)
    /// counts as healthy.
    #[must_use]
    pub fn check_health(&self) -> HealthStatus {
        let data = self.snapshot();
        if data.count > 0 || data.source == "disabled" {
            self.health.set_success();
        } else {
            self.health.set_error("no recent mempool data");
        }
        self.health.status()
    }
}
