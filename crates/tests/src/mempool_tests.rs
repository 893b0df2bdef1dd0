use crate::common::el_client;
use blockfuse_core::config::MempoolConfig;
use blockfuse_core::mempool::MempoolMonitor;
use serde_json::json;

fn pending_block_body(transactions: serde_json::Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "number": "0x10",
            "transactions": transactions,
        }
    })
    .to_string()
}

#[tokio::test]
async fn one_poll_tick_builds_a_complete_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(
            json!({"method": "eth_getBlockByNumber", "params": ["pending", true]}),
        ))
        .with_status(200)
        .with_body(pending_block_body(json!([{
            "hash": "0x1",
            "from": "0xa",
            "to": "0xb",
            "value": "0xde0b6b3a7640000",
            "gasPrice": "0xba43b7400",
            "gas": "0x5208",
            "nonce": "0x1",
            "input": "0x",
        }])))
        .create_async()
        .await;

    let monitor = MempoolMonitor::new(el_client(vec![server.url()]), &MempoolConfig {
        disabled: false,
    });
    monitor.poll_once().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.count, 1);
    assert_eq!(snapshot.source, "polling");
    assert_eq!(snapshot.pending_txs[0].hash, "0x1");
    assert_eq!(snapshot.pending_txs[0].timestamp, snapshot.last_update);

    let metrics = snapshot.metrics.expect("metrics should be computed");
    assert_eq!(metrics.total_gas_requested, 21_000);
    assert_eq!(metrics.total_value_wei, "0xde0b6b3a7640000");
    assert_eq!(metrics.avg_gas_price, 50.0);
    assert_eq!(metrics.high_priority_count, 0);
}

#[tokio::test]
async fn empty_poll_does_not_clobber_the_previous_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let populated = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(pending_block_body(json!([{
            "hash": "0x1", "from": "0xa", "value": "0x1",
            "gas": "0x5208", "nonce": "0x0", "input": "0x",
        }])))
        .expect(1)
        .create_async()
        .await;

    let monitor = MempoolMonitor::new(el_client(vec![server.url()]), &MempoolConfig {
        disabled: false,
    });
    monitor.poll_once().await;
    assert_eq!(monitor.snapshot().count, 1);
    let first_update = monitor.snapshot().last_update;
    populated.assert_async().await;

    // Newest mock wins: subsequent polls see an empty pending block.
    let _empty = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(pending_block_body(json!([])))
        .create_async()
        .await;
    monitor.poll_once().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.count, 1, "empty poll must not clear the snapshot");
    assert_eq!(snapshot.last_update, first_update);
}

#[tokio::test]
async fn failed_poll_keeps_the_previous_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let _populated = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(pending_block_body(json!([{
            "hash": "0x1", "from": "0xa", "value": "0x1",
            "gas": "0x5208", "nonce": "0x0", "input": "0x",
        }])))
        .expect(1)
        .create_async()
        .await;

    let monitor = MempoolMonitor::new(el_client(vec![server.url()]), &MempoolConfig {
        disabled: false,
    });
    monitor.poll_once().await;

    let _broken = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("down")
        .create_async()
        .await;
    monitor.poll_once().await;
    assert_eq!(monitor.snapshot().count, 1);
}

#[tokio::test]
async fn disabled_mode_installs_the_mock_snapshot() {
    let monitor = std::sync::Arc::new(MempoolMonitor::new(
        el_client(vec!["http://127.0.0.1:1".to_string()]),
        &MempoolConfig { disabled: true },
    ));
    std::sync::Arc::clone(&monitor).start();

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.source, "disabled");
    assert_eq!(snapshot.count, 10);
    assert_eq!(snapshot.pending_txs.len(), 10);
    assert!(snapshot.pending_txs[0].hash.starts_with("0x"));
    assert!(monitor.check_health().healthy);
}
