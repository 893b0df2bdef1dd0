//! Transaction lifecycle resolution: mempool → block → finality.
//!
//! One entry point stitches execution-layer data (transaction, receipt,
//! inclusion block), relay data (which builder/relay delivered the block),
//! and consensus-layer data (slot and finality) into a single response.
//! Everything beyond the primary transaction fetch is best-effort: a failed
//! enrichment leaves its sub-field null rather than failing the call.

use crate::config::parse_hex_u64;
use crate::decode::decode_transaction_input;
use crate::upstream::beacon::BeaconClient;
use crate::upstream::el::{ElClient, ElError};
use crate::upstream::relay::RelayClient;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TrackError {
    /// The transaction is not visible on the execution node.
    #[error("transaction not found")]
    NotFound,

    /// The primary EL fetch failed outright.
    #[error(transparent)]
    Upstream(#[from] ElError),

    /// `latest` could not be resolved to a concrete transaction.
    #[error("failed to resolve transaction")]
    Unresolvable,
}

/// Resolves full lifecycle data for a single transaction.
pub struct LifecycleTracker {
    el: Arc<ElClient>,
    beacon: Arc<BeaconClient>,
    relay: Arc<RelayClient>,
}

impl LifecycleTracker {
    #[must_use]
    pub fn new(el: Arc<ElClient>, beacon: Arc<BeaconClient>, relay: Arc<RelayClient>) -> Self {
        Self { el, beacon, relay }
    }

    /// Returns lifecycle data for `hash`, which may be the case-insensitive
    /// sentinel `latest`.
    ///
    /// # Errors
    ///
    /// [`TrackError::NotFound`] when the EL reports no such transaction;
    /// [`TrackError::Upstream`] / [`TrackError::Unresolvable`] when the
    /// primary fetch or the `latest` resolution fails.
    pub async fn track(&self, hash: &str) -> Result<Value, TrackError> {
        let hash = if hash.eq_ignore_ascii_case("latest") {
            self.resolve_latest().await?
        } else {
            hash.to_string()
        };

        let raw_tx = match self.el.call("eth_getTransactionByHash", json!([hash])).await {
            Ok(raw) => raw,
            Err(ElError::NullResult) => return Err(TrackError::NotFound),
            Err(e) => return Err(TrackError::Upstream(e)),
        };

        let tx_str = |key: &str| {
            raw_tx
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let tx_opt = |key: &str| raw_tx.get(key).and_then(Value::as_str).map(String::from);

        let block_number = tx_opt("blockNumber");
        let pending = block_number.is_none();
        let to = tx_opt("to");
        let value = tx_str("value");
        let input = tx_str("input");

        let mut economics = Map::new();
        economics.insert("value".to_string(), json!(value));
        economics.insert("gas_limit".to_string(), json!(tx_str("gas")));
        for (wire, ours) in [
            ("gasPrice", "gas_price"),
            ("maxFeePerGas", "max_fee_per_gas"),
            ("maxPriorityFeePerGas", "max_priority_fee_per_gas"),
        ] {
            if let Some(v) = tx_opt(wire) {
                economics.insert(ours.to_string(), json!(v));
            }
        }

        let mut response = Map::new();
        response.insert("hash".to_string(), json!(tx_str("hash")));
        response.insert("from".to_string(), json!(tx_str("from")));
        response.insert("to".to_string(), json!(to));
        response.insert("input".to_string(), json!(input));
        response.insert("status".to_string(), json!({ "pending": pending }));
        response.insert("pbs_relay".to_string(), Value::Null);
        response.insert("beacon".to_string(), Value::Null);
        response.insert("decoded".to_string(), Value::Null);

        let mut receipt: Option<Value> = None;
        if !pending {
            if let Ok(raw) = self
                .el
                .call("eth_getTransactionReceipt", json!([tx_str("hash")]))
                .await
            {
                if let Some(gas_used) = raw.get("gasUsed").and_then(Value::as_str) {
                    economics.insert("gas_used".to_string(), json!(gas_used));
                }
                if let Some(egp) = raw.get("effectiveGasPrice").and_then(Value::as_str) {
                    economics.insert("effective_gas_price".to_string(), json!(egp));
                }
                let success = raw.get("status").and_then(Value::as_str) == Some("0x1");
                response.insert(
                    "status".to_string(),
                    json!({ "pending": false, "success": success }),
                );
                receipt = Some(raw);
            }
        }
        response.insert("economics".to_string(), Value::Object(economics));

        if let Some(decoded) =
            decode_transaction_input(&input, to.as_deref(), &value, receipt.as_ref())
        {
            if let Ok(decoded) = serde_json::to_value(&decoded) {
                response.insert("decoded".to_string(), decoded);
            }
        }

        if let Some(block_number) = block_number {
            let (inclusion, pbs_relay, beacon_view) = self
                .resolve_inclusion(&raw_tx, &block_number)
                .await;
            response.insert("inclusion".to_string(), inclusion);
            if let Some(pbs) = pbs_relay {
                response.insert("pbs_relay".to_string(), pbs);
            }
            if let Some(b) = beacon_view {
                response.insert("beacon".to_string(), b);
            }
        }

        Ok(Value::Object(response))
    }

    /// Picks a representative transaction from the latest block: the first
    /// whose decoded action is something other than a generic contract
    /// call, retrying with receipt context, falling back to the first
    /// transaction outright.
    async fn resolve_latest(&self) -> Result<String, TrackError> {
        let raw_number = self.el.call("eth_blockNumber", json!([])).await?;
        let block_number = raw_number.as_str().ok_or(TrackError::Unresolvable)?;
        let raw_block = self
            .el
            .call("eth_getBlockByNumber", json!([block_number, true]))
            .await?;
        let transactions = raw_block
            .get("transactions")
            .and_then(Value::as_array)
            .filter(|txs| !txs.is_empty())
            .ok_or(TrackError::Unresolvable)?;

        for tx in transactions {
            let hash = tx.get("hash").and_then(Value::as_str).unwrap_or_default();
            let input = tx.get("input").and_then(Value::as_str).unwrap_or_default();
            let to = tx.get("to").and_then(Value::as_str);
            let value = tx.get("value").and_then(Value::as_str).unwrap_or_default();

            if decode_is_interesting(decode_transaction_input(input, to, value, None).as_ref()) {
                return Ok(hash.to_string());
            }
            // Generic at input-only decode: retry with receipt context.
            if let Ok(receipt) = self
                .el
                .call("eth_getTransactionReceipt", json!([hash]))
                .await
            {
                let decoded = decode_transaction_input(input, to, value, Some(&receipt));
                if decode_is_interesting(decoded.as_ref()) {
                    return Ok(hash.to_string());
                }
            }
        }
        debug!("no decodable transaction in latest block, using the first");
        Ok(transactions[0]
            .get("hash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Builds the inclusion sub-object plus the relay and beacon
    /// enrichments. Every failure here degrades to a missing field.
    async fn resolve_inclusion(
        &self,
        raw_tx: &Value,
        block_number: &str,
    ) -> (Value, Option<Value>, Option<Value>) {
        let mut inclusion = Map::new();
        inclusion.insert("block_number".to_string(), json!(block_number));
        let tx_index = raw_tx.get("transactionIndex").and_then(Value::as_str);
        if let Some(idx) = tx_index {
            inclusion.insert("transaction_index".to_string(), json!(idx));
        }

        let mut pbs_relay = None;
        let mut beacon_view = None;

        let raw_block = self
            .el
            .call("eth_getBlockByNumber", json!([block_number, true]))
            .await;
        if let Ok(block) = raw_block {
            let block_str = |key: &str| {
                block
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let transactions = block
                .get("transactions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            inclusion.insert("block_hash".to_string(), json!(block_str("hash")));
            inclusion.insert("timestamp".to_string(), json!(block_str("timestamp")));
            inclusion.insert("miner".to_string(), json!(block_str("miner")));
            inclusion.insert("block_gas_used".to_string(), json!(block_str("gasUsed")));
            inclusion.insert("block_gas_limit".to_string(), json!(block_str("gasLimit")));
            inclusion.insert("total_transactions".to_string(), json!(transactions.len()));

            if let Some(idx) = tx_index.and_then(parse_hex_u64) {
                let start = (idx as usize).saturating_sub(2);
                let end = ((idx as usize) + 3).min(transactions.len());
                let neighbors: Vec<Value> = transactions[start.min(end)..end]
                    .iter()
                    .enumerate()
                    .map(|(offset, tx)| {
                        json!({
                            "index": start + offset,
                            "hash": tx.get("hash").cloned().unwrap_or(Value::Null),
                            "from": tx.get("from").cloned().unwrap_or(Value::Null),
                            "to": tx.get("to").cloned().unwrap_or(Value::Null),
                            "value": tx.get("value").cloned().unwrap_or(Value::Null),
                        })
                    })
                    .collect();
                inclusion.insert("neighboring_transactions".to_string(), json!(neighbors));
            }

            if let Some(number) = parse_hex_u64(block_number) {
                pbs_relay = self.resolve_pbs(number).await;
                beacon_view = self.resolve_beacon(&block_str("timestamp")).await;
            }
        }

        (Value::Object(inclusion), pbs_relay, beacon_view)
    }

    /// Which builder/relay delivered this block, straight from delivered
    /// bidtraces filtered by block number.
    async fn resolve_pbs(&self, block_number: u64) -> Option<Value> {
        let path = format!(
            "/relay/v1/data/bidtraces/proposer_payload_delivered?block_number={block_number}"
        );
        let body = self.relay.get(&path).await.ok()?;
        let entries: Value = serde_json::from_slice(&body).ok()?;
        let entry = entries.as_array()?.first()?;
        Some(json!({
            "builder_pubkey": entry.get("builder_pubkey").cloned().unwrap_or(Value::Null),
            "proposer_pubkey": entry.get("proposer_pubkey").cloned().unwrap_or(Value::Null),
            "value": entry.get("value").cloned().unwrap_or(Value::Null),
            "relay": entry.get("relay").cloned().unwrap_or(Value::Null),
        }))
    }

    /// Slot and finality view derived from the beacon genesis time and the
    /// finalized checkpoint.
    async fn resolve_beacon(&self, block_timestamp_hex: &str) -> Option<Value> {
        let genesis = self.beacon.get_json("/eth/v1/beacon/genesis").await?;
        let genesis_time: u64 = genesis
            .pointer("/data/genesis_time")?
            .as_str()?
            .parse()
            .ok()?;
        let block_ts = parse_hex_u64(block_timestamp_hex)?;
        let slot = block_ts.saturating_sub(genesis_time) / 12;

        let finality = self
            .beacon
            .get_json("/eth/v1/beacon/states/finalized/finality_checkpoints")
            .await?;
        let epoch: u64 = finality
            .pointer("/data/finalized/epoch")?
            .as_str()?
            .parse()
            .ok()?;
        let finalized_slot = epoch * 32 + 31;
        Some(json!({
            "slot": slot,
            "is_finalized": slot <= finalized_slot,
            "finalized_epoch": epoch,
        }))
    }
}

fn decode_is_interesting(decoded: Option<&crate::decode::DecodedTx>) -> bool {
    decoded.is_some_and(|d| !d.action_type.is_empty() && d.action_type != "contract_call")
}
