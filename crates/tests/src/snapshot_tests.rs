use crate::common::{
    beacon_client, el_client, hanging_server, relay_client, relay_client_with_budget,
};
use blockfuse_core::config::{BeaconConfig, MempoolConfig, MevConfig, RelayConfig};
use blockfuse_core::mempool::MempoolMonitor;
use blockfuse_core::mev::MevAnalyzer;
use blockfuse_core::snapshot::SnapshotBuilder;
use blockfuse_core::upstream::beacon::BeaconClient;
use blockfuse_core::upstream::relay::RelayClient;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn builder(
    relay: Arc<RelayClient>,
    beacon: Arc<BeaconClient>,
    el_url: String,
    mempool_disabled: bool,
) -> SnapshotBuilder {
    let el = el_client(vec![el_url]);
    let mempool = Arc::new(MempoolMonitor::new(
        Arc::clone(&el),
        &MempoolConfig {
            disabled: mempool_disabled,
        },
    ));
    if mempool_disabled {
        Arc::clone(&mempool).start();
    }
    let mev = Arc::new(MevAnalyzer::new(
        Arc::clone(&el),
        &MevConfig {
            max_tx: 400,
            workers: 10,
        },
    ));
    SnapshotBuilder::new(mempool, relay, beacon, el, mev)
}

#[tokio::test]
async fn received_blocks_fall_back_to_delivered_payloads() {
    let mut relay_server = mockito::Server::new_async().await;
    // builder_blocks_received fails on every relay.
    let _mock_b = relay_server
        .mock("GET", "/relay/v1/data/bidtraces/builder_blocks_received")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .with_body("no")
        .create_async()
        .await;
    // Delivered payloads succeed (also serves the recent-slot probe).
    let _mock_c = relay_server
        .mock("GET", "/relay/v1/data/bidtraces/proposer_payload_delivered")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            json!([
                {"slot": "123", "block_hash": "0xaa", "block_number": "100"},
                {"slot": "124", "block_hash": "0xbb", "block_number": "101"},
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let mut beacon_server = mockito::Server::new_async().await;
    let _mock_d = beacon_server
        .mock("GET", "/eth/v1/beacon/states/finalized/finality_checkpoints")
        .with_status(200)
        .with_body(json!({"data": {"finalized": {"epoch": "10"}}}).to_string())
        .create_async()
        .await;

    let snapshot = builder(
        relay_client(vec![relay_server.url()]),
        beacon_client(beacon_server.url()),
        "http://127.0.0.1:1".to_string(),
        true,
    );

    let response = snapshot.build(10, false, "latest").await;
    let received = response["relays"]["received"].as_array().unwrap();
    let delivered = response["relays"]["delivered"].as_array().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received, delivered);
    assert_eq!(
        response["beacon"]["finality"]["data"]["finalized"]["epoch"],
        "10"
    );
    assert!(response["beacon"]["headers"]["count"].as_u64().unwrap() >= 1);
    assert!(response.get("mev").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn deadline_returns_partial_results_with_mempool_intact() {
    // Upstreams that accept connections and never answer, with client
    // timeouts far beyond the compose deadline.
    let hang = hanging_server().await;
    let relay = Arc::new(
        RelayClient::new(&RelayConfig {
            urls: vec![hang.clone()],
            timeout: Duration::from_secs(50),
            budget: Duration::from_secs(20),
            ok_ttl: Duration::from_secs(20),
            err_ttl: Duration::from_secs(10),
        })
        .unwrap(),
    );
    let beacon = Arc::new(
        BeaconClient::new(&BeaconConfig {
            base_url: hang.clone(),
            timeout: Duration::from_secs(50),
            ok_ttl: Duration::from_secs(20),
            err_ttl: Duration::from_secs(10),
        })
        .unwrap(),
    );

    let snapshot = builder(relay, beacon, hang, true);

    let started = Instant::now();
    let response = snapshot.build(10, false, "latest").await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(4_400) && elapsed < Duration::from_secs(6),
        "compose should give up at the deadline, took {elapsed:?}"
    );

    assert_eq!(response["relays"]["received"], json!([]));
    assert_eq!(response["relays"]["delivered"], json!([]));
    assert!(response["beacon"].get("headers").is_none());
    assert!(response["beacon"].get("finality").is_none());
    // The mempool snapshot is process-local and unaffected by the deadline.
    assert_eq!(response["mempool"]["count"], 10);
    assert_eq!(response["mempool"]["source"], "disabled");
    assert!(response["sources"]["relays"].as_array().is_some());
}

#[tokio::test]
async fn mev_failure_degrades_to_an_error_stub() {
    let mut relay_server = mockito::Server::new_async().await;
    let _mock_e = relay_server
        .mock("GET", "/relay/v1/data/bidtraces/proposer_payload_delivered")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let _mock_f = relay_server
        .mock("GET", "/relay/v1/data/bidtraces/builder_blocks_received")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let mut beacon_server = mockito::Server::new_async().await;
    let _mock_g = beacon_server
        .mock("GET", "/eth/v1/beacon/states/finalized/finality_checkpoints")
        .with_status(200)
        .with_body(json!({"data": {"finalized": {"epoch": "1"}}}).to_string())
        .create_async()
        .await;

    // The EL is unreachable, so the MEV block fetch fails fast.
    let snapshot = builder(
        relay_client_with_budget(vec![relay_server.url()], Duration::from_millis(2_500)),
        beacon_client(beacon_server.url()),
        "http://127.0.0.1:1".to_string(),
        true,
    );

    let response = snapshot.build(10, true, "latest").await;
    assert_eq!(response["mev"]["error"], "block fetch failed");
}
