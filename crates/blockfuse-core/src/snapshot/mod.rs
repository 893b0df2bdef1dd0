//! Aggregated snapshot composition.
//!
//! Four upstream sub-tasks (received blocks, delivered payloads, a
//! headers-style reshape, and CL finality) run in parallel under a soft
//! deadline. Whatever has completed when the deadline fires is assembled
//! into the response; missing sub-tasks contribute empty fields and never
//! propagate errors. Optional MEV analysis runs under its own, longer
//! deadline and degrades to an `{error}` stub.

use crate::mempool::MempoolMonitor;
use crate::mev::MevAnalyzer;
use crate::upstream::beacon::BeaconClient;
use crate::upstream::el::ElClient;
use crate::upstream::relay::RelayClient;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

/// Soft deadline for the four upstream sub-tasks.
const COMPOSE_DEADLINE: Duration = Duration::from_millis(4_500);
/// Separate deadline for the optional MEV analysis.
const MEV_DEADLINE: Duration = Duration::from_secs(6);
/// Bidtrace page size requested from each relay.
const BIDTRACE_LIMIT: usize = 200;

/// Renders a bidtrace field for use in a dedupe key. String values are
/// used verbatim; anything else falls back to its JSON rendering.
fn key_part(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn merge_bidtraces(
    bodies: &[Bytes],
    secondary_key: impl Fn(&Value) -> Option<String>,
) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in bodies {
        let Ok(Value::Array(list)) = serde_json::from_slice::<Value>(raw) else {
            continue;
        };
        for entry in list {
            let key = match entry.get("block_hash").and_then(Value::as_str) {
                Some(hash) if !hash.is_empty() => Some(hash.to_string()),
                _ => secondary_key(&entry),
            };
            match key {
                Some(key) => {
                    if seen.insert(key) {
                        out.push(entry);
                    }
                }
                // Entries with no usable key are never treated as duplicates.
                None => out.push(entry),
            }
        }
    }
    out
}

/// Merges `builder_blocks_received` bodies from multiple relays, deduping
/// by block hash, falling back to `slot-builder_pubkey`.
#[must_use]
pub fn merge_received_blocks(bodies: &[Bytes]) -> Vec<Value> {
    merge_bidtraces(bodies, |entry| {
        let slot = entry.get("slot");
        let builder = entry.get("builder_pubkey");
        if slot.is_none() && builder.is_none() {
            return None;
        }
        Some(format!("{}-{}", key_part(slot), key_part(builder)))
    })
}

/// Merges `proposer_payload_delivered` bodies, deduping by block hash,
/// falling back to `slot-block_number`.
#[must_use]
pub fn merge_delivered_payloads(bodies: &[Bytes]) -> Vec<Value> {
    merge_bidtraces(bodies, |entry| {
        let slot = entry.get("slot");
        let block_number = entry.get("block_number");
        if slot.is_none() && block_number.is_none() {
            return None;
        }
        Some(format!("{}-{}", key_part(slot), key_part(block_number)))
    })
}

/// Reshapes merged delivered payloads into the headers-style view used by
/// the snapshot's `beacon.headers` field, capped at the bidtrace page size.
#[must_use]
pub fn reshape_delivered_headers(merged: &[Value]) -> Vec<Value> {
    merged
        .iter()
        .take(BIDTRACE_LIMIT)
        .map(|bid| {
            let f = |key: &str| bid.get(key).cloned().unwrap_or(Value::Null);
            json!({
                "slot": f("slot"),
                "proposer_pubkey": f("proposer_pubkey"),
                "proposer_index": "",
                "builder_payment_eth": f("value"),
                "block_number": f("block_number"),
                "gas_used": f("gas_used"),
                "gas_limit": f("gas_limit"),
                "num_tx": f("num_tx"),
                "builder_pubkey": f("builder_pubkey"),
                "block_hash": f("block_hash"),
            })
        })
        .collect()
}

#[derive(Default)]
struct SnapshotParts {
    received: Option<Vec<Value>>,
    delivered: Option<Vec<Value>>,
    headers: Option<Value>,
    finality: Option<Value>,
}

/// Budgeted parallel composer for the aggregated snapshot.
pub struct SnapshotBuilder {
    mempool: Arc<MempoolMonitor>,
    relay: Arc<RelayClient>,
    beacon: Arc<BeaconClient>,
    el: Arc<ElClient>,
    mev: Arc<MevAnalyzer>,
}

impl SnapshotBuilder {
    #[must_use]
    pub fn new(
        mempool: Arc<MempoolMonitor>,
        relay: Arc<RelayClient>,
        beacon: Arc<BeaconClient>,
        el: Arc<ElClient>,
        mev: Arc<MevAnalyzer>,
    ) -> Self {
        Self {
            mempool,
            relay,
            beacon,
            el,
            mev,
        }
    }

    /// Sanitized upstream URLs for the `sources` field.
    #[must_use]
    pub fn sources_info(&self) -> Value {
        let (rpc_http, rpc_ws) = self.el.source_info();
        json!({
            "rpc_http": rpc_http,
            "rpc_ws": rpc_ws,
            "beacon_api": self.beacon.source_info(),
            "relays": self.relay.source_info(),
        })
    }

    /// Builds the aggregated snapshot. Never fails: missing upstream data
    /// shows up as empty fields.
    pub async fn build(&self, limit: usize, include_mev: bool, block_tag: &str) -> Value {
        let mempool = self.mempool.snapshot();
        let parts = Arc::new(Mutex::new(SnapshotParts::default()));

        let received_task = {
            let relay = Arc::clone(&self.relay);
            let parts = Arc::clone(&parts);
            tokio::spawn(async move {
                let mut merged: Option<Vec<Value>> = None;
                // builder_blocks_received requires a slot filter on most relays.
                if let Ok(slot) = relay.recent_slot().await {
                    let path = format!(
                        "/relay/v1/data/bidtraces/builder_blocks_received?slot={slot}&limit={BIDTRACE_LIMIT}"
                    );
                    let bodies = relay.get_from_all(&path).await;
                    if !bodies.is_empty() {
                        merged = Some(merge_received_blocks(&bodies));
                    }
                }
                if merged.is_none() {
                    // Fallback: delivered payloads as a proxy for received.
                    let path = format!(
                        "/relay/v1/data/bidtraces/proposer_payload_delivered?limit={BIDTRACE_LIMIT}"
                    );
                    let bodies = relay.get_from_all(&path).await;
                    if !bodies.is_empty() {
                        merged = Some(merge_delivered_payloads(&bodies));
                    }
                }
                if let Some(list) = merged {
                    parts.lock().await.received = Some(list);
                }
            })
        };

        let delivered_task = {
            let relay = Arc::clone(&self.relay);
            let parts = Arc::clone(&parts);
            tokio::spawn(async move {
                let path = format!(
                    "/relay/v1/data/bidtraces/proposer_payload_delivered?limit={BIDTRACE_LIMIT}"
                );
                let bodies = relay.get_from_all(&path).await;
                if !bodies.is_empty() {
                    parts.lock().await.delivered = Some(merge_delivered_payloads(&bodies));
                }
            })
        };

        let headers_task = {
            let relay = Arc::clone(&self.relay);
            let parts = Arc::clone(&parts);
            tokio::spawn(async move {
                let path = format!(
                    "/relay/v1/data/bidtraces/proposer_payload_delivered?limit={BIDTRACE_LIMIT}"
                );
                let bodies = relay.get_from_all(&path).await;
                if bodies.is_empty() {
                    return;
                }
                let merged = merge_delivered_payloads(&bodies);
                let enriched = reshape_delivered_headers(&merged);
                let count = enriched.len();
                parts.lock().await.headers =
                    Some(json!({ "headers": enriched, "count": count }));
            })
        };

        let finality_task = {
            let beacon = Arc::clone(&self.beacon);
            let parts = Arc::clone(&parts);
            tokio::spawn(async move {
                if let Some(finality) = beacon
                    .get_json("/eth/v1/beacon/states/finalized/finality_checkpoints")
                    .await
                {
                    parts.lock().await.finality = Some(finality);
                }
            })
        };

        let handles = [received_task, delivered_task, headers_task, finality_task];
        let aborts: Vec<_> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();
        let mut joined = futures::future::join_all(handles);
        if tokio::time::timeout(COMPOSE_DEADLINE, &mut joined).await.is_err() {
            warn!("snapshot compose deadline exceeded, returning partial results");
            for abort in aborts {
                abort.abort();
            }
        }

        let parts = {
            let mut guard = parts.lock().await;
            std::mem::take(&mut *guard)
        };
        let mut beacon_data = Map::new();
        if let Some(headers) = parts.headers {
            beacon_data.insert("headers".to_string(), headers);
        }
        if let Some(finality) = parts.finality {
            beacon_data.insert("finality".to_string(), finality);
        }

        let mut response = json!({
            "timestamp": Utc::now().timestamp(),
            "limit": limit,
            "mempool": mempool,
            "relays": {
                "received": parts.received.unwrap_or_default(),
                "delivered": parts.delivered.unwrap_or_default(),
            },
            "beacon": Value::Object(beacon_data),
            "sources": self.sources_info(),
        });

        if include_mev {
            response["mev"] = self.build_mev(limit, block_tag).await;
        }
        response
    }

    async fn build_mev(&self, limit: usize, block_tag: &str) -> Value {
        let analyzer = Arc::clone(&self.mev);
        let tag = block_tag.to_string();
        let task = tokio::spawn(async move {
            let block = match analyzer.fetch_block(&tag).await {
                Ok(block) => block,
                Err(_) => return json!({ "error": "block fetch failed" }),
            };
            let mut analysis = analyzer.analyze(&block).await;
            if analysis.sandwiches.len() > limit {
                analysis.sandwiches.truncate(limit);
                analysis.sandwich_count = analysis.sandwiches.len();
            }
            serde_json::to_value(&analysis)
                .unwrap_or_else(|_| json!({ "error": "mev serialization failed" }))
        });

        match tokio::time::timeout(MEV_DEADLINE, task).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) | Err(_) => {
                warn!("mev analysis timed out or failed inside snapshot");
                json!({ "error": "mev analysis timeout" })
            }
        }
    }
}
