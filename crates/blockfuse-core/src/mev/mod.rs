//! Block-level MEV pattern detection.
//!
//! The analyzer fetches receipts for the first N transactions of a block
//! with bounded concurrency, projects known log topics into a totally
//! ordered event stream, and runs four heuristic detectors over it:
//! sandwiches, atomic arbitrage, lending liquidations, and just-in-time
//! liquidity. Searcher identity is approximated by `tx.from` and pools by
//! the emitting log address; these are deliberately simple heuristics with
//! no completeness guarantee.

use crate::config::{parse_hex_u64, MevConfig};
use crate::upstream::el::{ElClient, ElError};
use alloy_primitives::keccak256;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

fn keccak_topic(signature: &str) -> String {
    keccak256(signature.as_bytes()).to_string()
}

static SWAP_TOPIC_V2: Lazy<String> =
    Lazy::new(|| keccak_topic("Swap(address,uint256,uint256,uint256,uint256,address)"));
static SWAP_TOPIC_V3: Lazy<String> =
    Lazy::new(|| keccak_topic("Swap(address,address,int256,int256,uint160,uint128,int24)"));
static MINT_TOPIC_V2: Lazy<String> = Lazy::new(|| keccak_topic("Mint(address,uint256,uint256)"));
static MINT_TOPIC_V3: Lazy<String> =
    Lazy::new(|| keccak_topic("Mint(address,address,int24,int24,uint128,uint256,uint256)"));
static BURN_TOPIC_V2: Lazy<String> =
    Lazy::new(|| keccak_topic("Burn(address,uint256,uint256,address)"));
static BURN_TOPIC_V3: Lazy<String> =
    Lazy::new(|| keccak_topic("Burn(address,int24,int24,uint128,uint256,uint256)"));
static LIQUIDATION_AAVE: Lazy<String> = Lazy::new(|| {
    keccak_topic("LiquidationCall(address,address,address,uint256,uint256,address,bool)")
});
static LIQUIDATION_COMPOUND: Lazy<String> =
    Lazy::new(|| keccak_topic("LiquidateBorrow(address,address,uint256,address,uint256)"));

/// Minimal block view used for MEV detection.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub number: String,
    pub hash: String,
    pub timestamp: String,
    pub transactions: Vec<TxRef>,
}

#[derive(Debug, Clone)]
pub struct TxRef {
    pub hash: String,
    pub from: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MevEventKind {
    Swap,
    Mint,
    Burn,
    Liquidation,
}

/// One MEV-relevant log event, addressable by `(tx_index, log_index)`.
#[derive(Debug, Clone)]
pub struct MevEvent {
    pub kind: MevEventKind,
    pub tx_hash: String,
    pub tx_index: usize,
    pub log_index: u64,
    /// Transaction originator, the proxy for the MEV actor.
    pub searcher: String,
    /// Emitting contract, the liquidity-pool grouping key.
    pub pool: String,
    /// Liquidation context: protocol tag, plus borrower for Aave.
    pub extra: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sandwich {
    pub pool: String,
    pub attacker: String,
    pub victim: String,
    #[serde(rename = "preTx")]
    pub pre_tx: String,
    #[serde(rename = "victimTx")]
    pub victim_tx: String,
    #[serde(rename = "postTx")]
    pub post_tx: String,
    pub block: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Arbitrage {
    pub searcher: String,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    pub pools: Vec<String>,
    #[serde(rename = "swapCount")]
    pub swap_count: usize,
    pub block: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Liquidation {
    pub liquidator: String,
    pub borrower: String,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    pub protocol: String,
    pub block: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JitLiquidity {
    pub provider: String,
    pub pool: String,
    #[serde(rename = "mintTx")]
    pub mint_tx: String,
    #[serde(rename = "swapTx")]
    pub swap_tx: String,
    #[serde(rename = "burnTx")]
    pub burn_tx: String,
    pub block: String,
}

/// Complete MEV analysis result for one block.
#[derive(Debug, Clone, Serialize)]
pub struct MevAnalysis {
    pub block: String,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "txScanned")]
    pub tx_scanned: usize,
    #[serde(rename = "totalTx")]
    pub total_tx: usize,
    #[serde(rename = "swapCount")]
    pub swap_count: usize,
    pub sandwiches: Vec<Sandwich>,
    pub arbitrages: Vec<Arbitrage>,
    pub liquidations: Vec<Liquidation>,
    #[serde(rename = "jitLiquidity")]
    pub jit_liquidity: Vec<JitLiquidity>,
    #[serde(rename = "sandwichCount")]
    pub sandwich_count: usize,
    #[serde(rename = "arbitrageCount")]
    pub arbitrage_count: usize,
    #[serde(rename = "liquidationCount")]
    pub liquidation_count: usize,
    #[serde(rename = "jitCount")]
    pub jit_count: usize,
}

/// Bounded-concurrency receipt scanner and detector host.
pub struct MevAnalyzer {
    el: Arc<ElClient>,
    max_tx: usize,
    workers: usize,
}

impl MevAnalyzer {
    #[must_use]
    pub fn new(el: Arc<ElClient>, config: &MevConfig) -> Self {
        Self {
            el,
            max_tx: config.max_tx.clamp(10, 1_000),
            workers: config.workers.clamp(1, 50),
        }
    }

    /// Fetches a full block by tag for analysis.
    ///
    /// # Errors
    ///
    /// Any EL failure, including a null result for an unknown tag.
    pub async fn fetch_block(&self, tag: &str) -> Result<BlockSummary, ElError> {
        let raw = self
            .el
            .call("eth_getBlockByNumber", json!([tag, true]))
            .await?;
        let field = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let transactions = raw
            .get("transactions")
            .and_then(Value::as_array)
            .map(|txs| {
                txs.iter()
                    .map(|tx| TxRef {
                        hash: tx
                            .get("hash")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        from: tx
                            .get("from")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(BlockSummary {
            number: field("number"),
            hash: field("hash"),
            timestamp: field("timestamp"),
            transactions,
        })
    }

    /// Scans receipts for the first `min(len, max_tx)` transactions and
    /// returns every recognized event ordered by `(tx_index, log_index)`.
    ///
    /// Individual receipt failures are swallowed; those transactions simply
    /// contribute no events.
    pub async fn collect_events(&self, block: &BlockSummary) -> Vec<MevEvent> {
        let scan_count = block.transactions.len().min(self.max_tx);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (index, tx) in block.transactions.iter().take(scan_count).enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let el = Arc::clone(&self.el);
            let hash = tx.hash.clone();
            let from = tx.from.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let receipt = el
                    .call("eth_getTransactionReceipt", json!([hash]))
                    .await
                    .ok()?;
                Some(events_from_receipt(index, &from, &receipt))
            });
        }

        let mut events = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(batch)) = joined {
                events.extend(batch);
            }
        }
        events.sort_by_key(|e| (e.tx_index, e.log_index));
        debug!(
            scanned = scan_count,
            events = events.len(),
            "mev receipt scan complete"
        );
        events
    }

    /// Runs the full analysis pipeline on a block.
    pub async fn analyze(&self, block: &BlockSummary) -> MevAnalysis {
        let events = self.collect_events(block).await;
        analyze_events(block, &events, self.max_tx)
    }

    #[must_use]
    pub fn max_tx(&self) -> usize {
        self.max_tx
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Projects one receipt's logs into MEV events.
fn events_from_receipt(tx_index: usize, from: &str, receipt: &Value) -> Vec<MevEvent> {
    let tx_hash = receipt
        .get("transactionHash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    let Some(logs) = receipt.get("logs").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for log in logs {
        let Some(topics) = log.get("topics").and_then(Value::as_array) else {
            continue;
        };
        let Some(topic0) = topics.first().and_then(Value::as_str) else {
            continue;
        };
        let topic0 = topic0.to_lowercase();
        let log_index = log
            .get("logIndex")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64)
            .unwrap_or(0);
        let base = MevEvent {
            kind: MevEventKind::Swap,
            tx_hash: tx_hash.clone(),
            tx_index,
            log_index,
            searcher: from.to_lowercase(),
            pool: log
                .get("address")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase(),
            extra: String::new(),
        };

        if topic0 == *SWAP_TOPIC_V2 || topic0 == *SWAP_TOPIC_V3 {
            events.push(base);
        } else if topic0 == *MINT_TOPIC_V2 || topic0 == *MINT_TOPIC_V3 {
            events.push(MevEvent {
                kind: MevEventKind::Mint,
                ..base
            });
        } else if topic0 == *BURN_TOPIC_V2 || topic0 == *BURN_TOPIC_V3 {
            events.push(MevEvent {
                kind: MevEventKind::Burn,
                ..base
            });
        } else if topic0 == *LIQUIDATION_AAVE {
            let extra = match topics.get(3).and_then(Value::as_str) {
                Some(borrower) => format!("aave:{}", borrower.to_lowercase()),
                None => "aave".to_string(),
            };
            events.push(MevEvent {
                kind: MevEventKind::Liquidation,
                extra,
                ..base
            });
        } else if topic0 == *LIQUIDATION_COMPOUND {
            events.push(MevEvent {
                kind: MevEventKind::Liquidation,
                extra: "compound".to_string(),
                ..base
            });
        }
    }
    events
}

/// Runs all detectors over an ordered event stream.
#[must_use]
pub fn analyze_events(block: &BlockSummary, events: &[MevEvent], max_tx: usize) -> MevAnalysis {
    let swaps: Vec<&MevEvent> = events
        .iter()
        .filter(|e| e.kind == MevEventKind::Swap)
        .collect();
    let sandwiches = detect_sandwiches(&swaps, &block.number);
    let arbitrages = detect_arbitrage(events, &block.number);
    let liquidations = detect_liquidations(events, &block.number);
    let jit_liquidity = detect_jit_liquidity(events, &block.number);

    MevAnalysis {
        block: block.number.clone(),
        block_hash: block.hash.clone(),
        tx_scanned: block.transactions.len().min(max_tx),
        total_tx: block.transactions.len(),
        swap_count: swaps.len(),
        sandwich_count: sandwiches.len(),
        arbitrage_count: arbitrages.len(),
        liquidation_count: liquidations.len(),
        jit_count: jit_liquidity.len(),
        sandwiches,
        arbitrages,
        liquidations,
        jit_liquidity,
    }
}

/// Finds pre/victim/post swap triples per pool.
///
/// A match consumes all three positions (the scan advances by three) so
/// overlapping sandwich claims are never emitted. Ordering across pools is
/// unspecified.
#[must_use]
pub fn detect_sandwiches(swaps: &[&MevEvent], block: &str) -> Vec<Sandwich> {
    let mut grouped: HashMap<&str, Vec<&MevEvent>> = HashMap::new();
    for swap in swaps {
        grouped.entry(swap.pool.as_str()).or_default().push(swap);
    }

    let mut out = Vec::new();
    for (pool, sequence) in grouped {
        let mut i = 0;
        while i + 2 < sequence.len() {
            let (pre, victim, post) = (sequence[i], sequence[i + 1], sequence[i + 2]);
            let matched = !pre.searcher.is_empty()
                && !victim.searcher.is_empty()
                && !post.searcher.is_empty()
                && pre.searcher == post.searcher
                && pre.searcher != victim.searcher;
            if matched {
                out.push(Sandwich {
                    pool: pool.to_string(),
                    attacker: pre.searcher.clone(),
                    victim: victim.searcher.clone(),
                    pre_tx: pre.tx_hash.clone(),
                    victim_tx: victim.tx_hash.clone(),
                    post_tx: post.tx_hash.clone(),
                    block: block.to_string(),
                });
                i += 3;
            } else {
                i += 1;
            }
        }
    }
    out
}

/// Finds transactions with at least two swaps across at least two distinct
/// pools (atomic arbitrage).
#[must_use]
pub fn detect_arbitrage(events: &[MevEvent], block: &str) -> Vec<Arbitrage> {
    let mut by_tx: HashMap<&str, Vec<&MevEvent>> = HashMap::new();
    for event in events {
        if event.kind == MevEventKind::Swap {
            by_tx.entry(event.tx_hash.as_str()).or_default().push(event);
        }
    }

    let mut out = Vec::new();
    for (tx_hash, swaps) in by_tx {
        if swaps.len() < 2 {
            continue;
        }
        let pools: HashSet<&str> = swaps.iter().map(|s| s.pool.as_str()).collect();
        if pools.len() >= 2 {
            out.push(Arbitrage {
                searcher: swaps[0].searcher.clone(),
                tx_hash: tx_hash.to_string(),
                pools: pools.into_iter().map(String::from).collect(),
                swap_count: swaps.len(),
                block: block.to_string(),
            });
        }
    }
    out
}

/// Projects liquidation events into findings.
#[must_use]
pub fn detect_liquidations(events: &[MevEvent], block: &str) -> Vec<Liquidation> {
    events
        .iter()
        .filter(|e| e.kind == MevEventKind::Liquidation)
        .map(|e| {
            let (protocol, borrower) = if e.extra.starts_with("compound") {
                ("Compound", String::new())
            } else if let Some(borrower) = e.extra.strip_prefix("aave:") {
                ("Aave", borrower.to_string())
            } else {
                ("Aave", String::new())
            };
            Liquidation {
                liquidator: e.searcher.clone(),
                borrower,
                tx_hash: e.tx_hash.clone(),
                protocol: protocol.to_string(),
                block: block.to_string(),
            }
        })
        .collect()
}

/// Finds mint→swap→burn patterns in one pool: a provider mints, a
/// different searcher swaps, and the provider burns afterwards. Each
/// (mint, burn) pair contributes at most one finding.
#[must_use]
pub fn detect_jit_liquidity(events: &[MevEvent], block: &str) -> Vec<JitLiquidity> {
    let mut by_pool: HashMap<&str, Vec<&MevEvent>> = HashMap::new();
    for event in events {
        if matches!(
            event.kind,
            MevEventKind::Mint | MevEventKind::Swap | MevEventKind::Burn
        ) {
            by_pool.entry(event.pool.as_str()).or_default().push(event);
        }
    }

    let mut out = Vec::new();
    for (pool, pool_events) in by_pool {
        let mints: Vec<&&MevEvent> = pool_events
            .iter()
            .filter(|e| e.kind == MevEventKind::Mint)
            .collect();
        let swaps: Vec<&&MevEvent> = pool_events
            .iter()
            .filter(|e| e.kind == MevEventKind::Swap)
            .collect();
        let burns: Vec<&&MevEvent> = pool_events
            .iter()
            .filter(|e| e.kind == MevEventKind::Burn)
            .collect();

        for mint in &mints {
            for burn in &burns {
                if mint.searcher != burn.searcher || mint.tx_index >= burn.tx_index {
                    continue;
                }
                let victim_swap = swaps.iter().find(|swap| {
                    swap.tx_index > mint.tx_index
                        && swap.tx_index < burn.tx_index
                        && swap.searcher != mint.searcher
                });
                if let Some(swap) = victim_swap {
                    out.push(JitLiquidity {
                        provider: mint.searcher.clone(),
                        pool: pool.to_string(),
                        mint_tx: mint.tx_hash.clone(),
                        swap_tx: swap.tx_hash.clone(),
                        burn_tx: burn.tx_hash.clone(),
                        block: block.to_string(),
                    });
                }
            }
        }
    }
    out
}
