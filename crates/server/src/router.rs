//! Route table, response envelope, and all API handlers.
//!
//! Every response is wrapped in the envelope `{data}` or
//! `{error: {kind, message, hint?}}`, never both, except the raw
//! passthrough endpoints (`/api/block`, `/api/finality`) which forward the
//! upstream body unchanged. CORS is restricted to the configured origin
//! and handler panics surface as `INTERNAL` 500s.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use blockfuse_core::config::{parse_hex_u64, ServerConfig};
use blockfuse_core::health::build_overall;
use blockfuse_core::mev::{detect_sandwiches, MevEvent, MevEventKind};
use blockfuse_core::snapshot::{merge_delivered_payloads, merge_received_blocks};
use blockfuse_core::track::TrackError;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::state::AppState;

#[derive(Serialize)]
struct ApiError {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    hint: String,
}

/// The response envelope: exactly one of `data` or `error` is present.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

fn api_ok(data: impl Serialize) -> Response {
    Json(Envelope {
        error: None,
        data: Some(data),
    })
    .into_response()
}

fn api_err(status: StatusCode, kind: &str, message: &str, hint: &str) -> Response {
    (
        status,
        Json(Envelope::<Value> {
            error: Some(ApiError {
                kind: kind.to_string(),
                message: message.to_string(),
                hint: hint.to_string(),
            }),
            data: None,
        }),
    )
        .into_response()
}

fn raw_json(body: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    error!(detail = %detail, "handler panic");
    api_err(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL",
        "Handler panic",
        "",
    )
}

type Params = Query<HashMap<String, String>>;

/// Reads `?limit=N` clamped to `[1, 200]`.
fn parse_limit(params: &HashMap<String, String>, default: usize) -> usize {
    params
        .get("limit")
        .and_then(|s| s.parse::<i64>().ok())
        .map_or(default, |n| n.clamp(1, 200) as usize)
}

pub fn build(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3000"));
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/mempool", get(handle_mempool))
        .route("/api/relays/delivered", get(handle_relays_delivered))
        .route("/api/relays/received", get(handle_relays_received))
        .route("/api/validators/head", get(handle_beacon_headers))
        .route("/api/finality", get(handle_finality))
        .route("/api/snapshot", get(handle_snapshot))
        .route("/api/block", get(handle_block_latest))
        .route("/api/block/{id}", get(handle_block))
        .route("/api/mev/sandwich", get(handle_sandwich))
        .route("/api/track/tx", get(handle_track_missing))
        .route("/api/track/tx/{hash}", get(handle_track))
        .route("/api/health", get(handle_health))
        .route("/api/health/live", get(handle_liveness))
        .route("/api/health/ready", get(handle_readiness))
        .layer(CatchPanicLayer::custom(
            handle_panic as fn(Box<dyn std::any::Any + Send + 'static>) -> Response,
        ))
        .layer(cors)
        .with_state(state)
}

async fn handle_mempool(State(state): State<Arc<AppState>>) -> Response {
    api_ok(state.mempool.snapshot())
}

/// Latest EL block number, best-effort; zero when the EL is unreachable.
async fn latest_block_number(state: &AppState) -> u64 {
    match state.el.call("eth_blockNumber", json!([])).await {
        Ok(raw) => raw.as_str().and_then(parse_hex_u64).unwrap_or(0),
        Err(_) => 0,
    }
}

async fn handle_relays_delivered(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let limit = parse_limit(&params, 10);
    let path = format!("/relay/v1/data/bidtraces/proposer_payload_delivered?limit={limit}");
    let raw = match state.relay.get(&path).await {
        Ok(raw) => raw,
        Err(_) => {
            return api_err(
                StatusCode::TOO_MANY_REQUESTS,
                "RELAY",
                "Failed to fetch delivered payloads",
                "MEV relays may be rate limiting or unavailable",
            )
        }
    };
    let Ok(delivered) = serde_json::from_slice::<Vec<Value>>(&raw) else {
        return api_err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "RELAY_PARSE",
            "Failed to parse delivered payloads",
            "",
        );
    };
    let latest_block = latest_block_number(&state).await;
    let count = delivered.len();
    api_ok(json!({
        "delivered_payloads": delivered,
        "count": count,
        "latest_block": latest_block,
    }))
}

async fn handle_relays_received(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let limit = parse_limit(&params, 10);
    let mut received: Option<Vec<Value>> = None;
    if let Ok(slot) = state.relay.recent_slot().await {
        let path = format!(
            "/relay/v1/data/bidtraces/builder_blocks_received?slot={slot}&limit={limit}"
        );
        let bodies = state.relay.get_from_all(&path).await;
        if !bodies.is_empty() {
            received = Some(merge_received_blocks(&bodies));
        }
    }
    if received.is_none() {
        let path = format!("/relay/v1/data/bidtraces/proposer_payload_delivered?limit={limit}");
        let bodies = state.relay.get_from_all(&path).await;
        if !bodies.is_empty() {
            received = Some(merge_delivered_payloads(&bodies));
        }
    }
    let Some(received) = received else {
        return api_err(
            StatusCode::TOO_MANY_REQUESTS,
            "RELAY",
            "Failed to fetch received blocks",
            "MEV relays may be rate limiting or unavailable",
        );
    };
    let latest_block = latest_block_number(&state).await;
    let count = received.len();
    api_ok(json!({
        "received_blocks": received,
        "count": count,
        "latest_block": latest_block,
    }))
}

async fn handle_beacon_headers(State(state): State<Arc<AppState>>) -> Response {
    let (headers_result, bids_result) = tokio::join!(
        state.beacon.get("/eth/v1/beacon/headers?limit=20"),
        state
            .relay
            .get("/relay/v1/data/bidtraces/proposer_payload_delivered?limit=50"),
    );

    let headers_response = match headers_result {
        Ok(response) if response.is_ok() => response,
        _ => {
            return api_err(
                StatusCode::TOO_MANY_REQUESTS,
                "BEACON",
                "Beacon headers fetch failed",
                "Public beacon API may be rate limiting.",
            )
        }
    };
    let Ok(headers_json) = serde_json::from_slice::<Value>(&headers_response.body) else {
        return raw_json(headers_response.body);
    };
    let Some(header_list) = headers_json.get("data").and_then(Value::as_array) else {
        return raw_json(headers_response.body);
    };

    let mut bids_by_slot: HashMap<String, Value> = HashMap::new();
    if let Ok(raw_bids) = bids_result {
        if let Ok(Value::Array(bids)) = serde_json::from_slice::<Value>(&raw_bids) {
            for bid in bids {
                if let Some(slot) = bid.get("slot").and_then(Value::as_str) {
                    bids_by_slot.insert(slot.to_string(), bid);
                }
            }
        }
    }

    let enriched: Vec<Value> = header_list
        .iter()
        .map(|h| {
            let message = h.pointer("/header/message");
            let slot = message
                .and_then(|m| m.get("slot"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let mut item = json!({
                "slot": slot,
                "proposer_index": message
                    .and_then(|m| m.get("proposer_index"))
                    .cloned()
                    .unwrap_or(Value::Null),
            });
            if let Some(bid) = bids_by_slot.get(slot) {
                for (from, to) in [
                    ("value", "builder_payment_eth"),
                    ("block_number", "block_number"),
                    ("gas_used", "gas_used"),
                    ("gas_limit", "gas_limit"),
                    ("num_tx", "num_tx"),
                    ("builder_pubkey", "builder_pubkey"),
                    ("proposer_fee_recipient", "proposer_fee_recipient"),
                ] {
                    item[to] = bid.get(from).cloned().unwrap_or(Value::Null);
                }
            }
            item
        })
        .collect();

    let count = enriched.len();
    api_ok(json!({ "headers": enriched, "count": count }))
}

async fn handle_finality(State(state): State<Arc<AppState>>) -> Response {
    match state
        .beacon
        .get("/eth/v1/beacon/states/finalized/finality_checkpoints")
        .await
    {
        Ok(response) if response.is_ok() => raw_json(response.body),
        _ => api_err(
            StatusCode::TOO_MANY_REQUESTS,
            "BEACON",
            "Finality checkpoints fetch failed",
            "",
        ),
    }
}

async fn handle_block_latest(state: State<Arc<AppState>>) -> Response {
    fetch_block_raw(state, "latest").await
}

async fn handle_block(state: State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let id = if id.is_empty() { "latest".to_string() } else { id };
    fetch_block_raw(state, &id).await
}

async fn fetch_block_raw(State(state): State<Arc<AppState>>, id: &str) -> Response {
    match state.el.call("eth_getBlockByNumber", json!([id, true])).await {
        Ok(block) => Json(block).into_response(),
        Err(_) => api_err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "EL_BLOCK",
            "Block fetch failed",
            "",
        ),
    }
}

async fn handle_sandwich(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let block_tag = params
        .get("block")
        .filter(|s| !s.is_empty())
        .map_or("latest", String::as_str);
    let block = match state.mev.fetch_block(block_tag).await {
        Ok(block) => block,
        Err(_) => {
            return api_err(
                StatusCode::INTERNAL_SERVER_ERROR,
                "EL_BLOCK_FETCH",
                "Failed to fetch block",
                "",
            )
        }
    };
    let events = state.mev.collect_events(&block).await;
    let swaps: Vec<&MevEvent> = events
        .iter()
        .filter(|e| e.kind == MevEventKind::Swap)
        .collect();
    let sandwiches = detect_sandwiches(&swaps, &block.number);
    api_ok(json!({
        "block": block.number,
        "blockHash": block.hash,
        "swapCount": swaps.len(),
        "sandwiches": sandwiches,
        "sources": state.snapshot.sources_info(),
        "note": "Heuristic: same address swaps before and after a victim in the same pool (Uniswap V2/V3).",
    }))
}

async fn handle_track_missing() -> Response {
    api_err(
        StatusCode::BAD_REQUEST,
        "BAD_REQUEST",
        "Missing transaction hash",
        "Invoke /api/track/tx/{hash} or /api/track/tx/latest",
    )
}

async fn handle_track(State(state): State<Arc<AppState>>, Path(hash): Path<String>) -> Response {
    if hash.is_empty() {
        return handle_track_missing().await;
    }
    match state.tracker.track(&hash).await {
        Ok(data) => api_ok(data),
        Err(TrackError::NotFound) => api_err(
            StatusCode::NOT_FOUND,
            "TX_NOT_FOUND",
            "Transaction not visible on this execution node",
            "",
        ),
        Err(e) => {
            error!(error = %e, "track resolution failed");
            api_err(
                StatusCode::BAD_GATEWAY,
                "RPC_ERROR",
                "Failed to resolve transaction",
                "",
            )
        }
    }
}

async fn handle_snapshot(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let started = std::time::Instant::now();
    let limit = parse_limit(&params, 10);
    let include_mev = matches!(
        params.get("sandwich").map(String::as_str),
        Some("1") | Some("true") | Some("yes")
    );
    let block_tag = params
        .get("block")
        .filter(|s| !s.is_empty())
        .map_or("latest", String::as_str);

    let cache_key = format!("limit={limit}|sandwich={include_mev}|block={block_tag}");
    if let Some(body) = state.snapshot_cache.get(&cache_key) {
        if !body.is_empty() {
            return raw_json(body);
        }
    }

    let data = state.snapshot.build(limit, include_mev, block_tag).await;
    let envelope = Envelope {
        error: None,
        data: Some(data),
    };
    let Ok(body) = serde_json::to_vec(&envelope) else {
        return api_err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "SNAPSHOT_MARSHAL",
            "Failed to serialize snapshot",
            "",
        );
    };
    let body = Bytes::from(body);
    state.snapshot_cache.set(cache_key, body.clone(), false);
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "snapshot served");
    raw_json(body)
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    let (el, beacon, relay) = tokio::join!(
        state.el.check_health(),
        state.beacon.check_health(),
        state.relay.check_health(),
    );
    let statuses = vec![el, beacon, relay, state.mempool.check_health()];
    api_ok(build_overall(statuses))
}

async fn handle_liveness() -> Response {
    (StatusCode::OK, "OK").into_response()
}

async fn handle_readiness(State(state): State<Arc<AppState>>) -> Response {
    let (beacon, el) = tokio::join!(state.beacon.check_health(), state.el.check_health());
    if beacon.healthy && el.healthy {
        (StatusCode::OK, "READY").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY").into_response()
    }
}
