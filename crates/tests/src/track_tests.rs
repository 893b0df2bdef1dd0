use crate::common::{beacon_client, el_client, relay_client};
use blockfuse_core::track::{LifecycleTracker, TrackError};
use serde_json::{json, Value};

fn rpc_result(result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string()
}

/// ERC-20 transfer calldata: selector + recipient + amount.
fn transfer_input() -> String {
    format!(
        "0xa9059cbb{:0>64}{:0>64}",
        "1111111111111111111111111111111111111111", "de0b6b3a7640000"
    )
}

fn block_with_transactions() -> Value {
    json!({
        "number": "0x10",
        "hash": "0xblockhash",
        "timestamp": "0x600",
        "miner": "0xminer",
        "gasUsed": "0x5208",
        "gasLimit": "0x1c9c380",
        "transactions": [
            {
                "hash": "0xt1",
                "from": "0xf1",
                "to": "0xdac17f958d2ee523a2206206994597c13d831ec7",
                "value": "0x0",
                "input": transfer_input(),
                "blockNumber": "0x10",
                "transactionIndex": "0x0",
                "gas": "0x5208",
                "nonce": "0x1",
            },
            {
                "hash": "0xt2",
                "from": "0xf2",
                "to": "0xsomecontract",
                "value": "0x0",
                "input": "0xdeadbeef00",
                "blockNumber": "0x10",
                "transactionIndex": "0x1",
                "gas": "0x5208",
                "nonce": "0x2",
            },
        ]
    })
}

async fn mock_el_for_latest(server: &mut mockito::ServerGuard) -> Vec<mockito::Mock> {
    let mut mocks = Vec::new();
    mocks.push(server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_blockNumber"}),
        ))
        .with_status(200)
        .with_body(rpc_result(json!("0x10")))
        .create_async()
        .await);
    mocks.push(server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_getBlockByNumber"}),
        ))
        .with_status(200)
        .with_body(rpc_result(block_with_transactions()))
        .create_async()
        .await);
    mocks.push(server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_getTransactionByHash"}),
        ))
        .with_status(200)
        .with_body(rpc_result(
            block_with_transactions()["transactions"][0].clone(),
        ))
        .create_async()
        .await);
    mocks.push(server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_getTransactionReceipt"}),
        ))
        .with_status(200)
        .with_body(rpc_result(json!({
            "transactionHash": "0xt1",
            "status": "0x1",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "logs": [],
        })))
        .create_async()
        .await);
    mocks
}

#[tokio::test]
async fn latest_resolves_to_the_first_decodable_transaction() {
    let mut el_server = mockito::Server::new_async().await;
    let _el_mocks = mock_el_for_latest(&mut el_server).await;

    let mut beacon_server = mockito::Server::new_async().await;
    let _mock_b = beacon_server
        .mock("GET", "/eth/v1/beacon/genesis")
        .with_status(200)
        .with_body(json!({"data": {"genesis_time": "1500"}}).to_string())
        .create_async()
        .await;
    let _mock_c = beacon_server
        .mock("GET", "/eth/v1/beacon/states/finalized/finality_checkpoints")
        .with_status(200)
        .with_body(json!({"data": {"finalized": {"epoch": "0"}}}).to_string())
        .create_async()
        .await;

    let mut relay_server = mockito::Server::new_async().await;
    let _mock_d = relay_server
        .mock("GET", "/relay/v1/data/bidtraces/proposer_payload_delivered")
        .match_query(mockito::Matcher::UrlEncoded(
            "block_number".into(),
            "16".into(),
        ))
        .with_status(200)
        .with_body(
            json!([{
                "builder_pubkey": "0xbuilder",
                "proposer_pubkey": "0xproposer",
                "value": "123",
                "relay": "test-relay",
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let tracker = LifecycleTracker::new(
        el_client(vec![el_server.url()]),
        beacon_client(beacon_server.url()),
        relay_client(vec![relay_server.url()]),
    );

    let data = tracker.track("latest").await.unwrap();

    // The plain token transfer wins over the unknown contract call.
    assert_eq!(data["hash"], "0xt1");
    assert_eq!(data["status"]["pending"], false);
    assert_eq!(data["status"]["success"], true);
    assert_eq!(data["decoded"]["action"], "Token Transfer");
    assert_eq!(data["economics"]["gas_used"], "0x5208");
    assert_eq!(data["economics"]["effective_gas_price"], "0x3b9aca00");

    // Inclusion details come from the block itself.
    assert_eq!(data["inclusion"]["block_hash"], "0xblockhash");
    assert_eq!(data["inclusion"]["total_transactions"], 2);
    let neighbors = data["inclusion"]["neighboring_transactions"]
        .as_array()
        .unwrap();
    assert_eq!(neighbors.len(), 2);
    assert_eq!(neighbors[0]["index"], 0);

    // Relay enrichment is keyed by decimal block number.
    assert_eq!(data["pbs_relay"]["builder_pubkey"], "0xbuilder");
    assert_eq!(data["pbs_relay"]["relay"], "test-relay");

    // Slot math: (0x600 - 1500) / 12 = 3; epoch 0 finalizes slot 31.
    assert_eq!(data["beacon"]["slot"], 3);
    assert_eq!(data["beacon"]["is_finalized"], true);
    assert_eq!(data["beacon"]["finalized_epoch"], 0);
}

#[tokio::test]
async fn unknown_hash_maps_to_not_found() {
    let mut el_server = mockito::Server::new_async().await;
    let _mock_e = el_server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_getTransactionByHash"}),
        ))
        .with_status(200)
        .with_body(rpc_result(Value::Null))
        .create_async()
        .await;

    let beacon_server = mockito::Server::new_async().await;
    let relay_server = mockito::Server::new_async().await;
    let tracker = LifecycleTracker::new(
        el_client(vec![el_server.url()]),
        beacon_client(beacon_server.url()),
        relay_client(vec![relay_server.url()]),
    );

    let err = tracker.track("0xdoesnotexist").await.unwrap_err();
    assert!(matches!(err, TrackError::NotFound));
}

#[tokio::test]
async fn pending_transactions_skip_inclusion_enrichment() {
    let mut el_server = mockito::Server::new_async().await;
    let _mock_f = el_server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_getTransactionByHash"}),
        ))
        .with_status(200)
        .with_body(rpc_result(json!({
            "hash": "0xpending",
            "from": "0xf1",
            "to": null,
            "value": "0x0",
            "input": "0x",
            "blockNumber": null,
            "gas": "0x5208",
            "nonce": "0x1",
            "maxFeePerGas": "0x77359400",
            "maxPriorityFeePerGas": "0x3b9aca00",
        })))
        .create_async()
        .await;

    let beacon_server = mockito::Server::new_async().await;
    let relay_server = mockito::Server::new_async().await;
    let tracker = LifecycleTracker::new(
        el_client(vec![el_server.url()]),
        beacon_client(beacon_server.url()),
        relay_client(vec![relay_server.url()]),
    );

    let data = tracker.track("0xpending").await.unwrap();
    assert_eq!(data["status"]["pending"], true);
    assert!(data["status"].get("success").is_none());
    assert!(data.get("inclusion").is_none());
    assert_eq!(data["pbs_relay"], Value::Null);
    assert_eq!(data["beacon"], Value::Null);
    assert_eq!(data["economics"]["max_fee_per_gas"], "0x77359400");
    assert_eq!(data["decoded"]["action"], "ETH Transfer");
}
