use crate::common::{relay_client, relay_client_with_budget};
use blockfuse_core::upstream::relay::RelayError;
use serde_json::json;
use std::time::Duration;

const DELIVERED_PATH: &str = "/relay/v1/data/bidtraces/proposer_payload_delivered";

#[tokio::test]
async fn get_falls_through_to_the_next_relay_on_failure() {
    let mut broken = mockito::Server::new_async().await;
    let broken_mock = broken
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;

    let mut working = mockito::Server::new_async().await;
    let working_mock = working
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(json!([{"slot": "100", "block_hash": "0xaa"}]).to_string())
        .create_async()
        .await;

    let relay = relay_client(vec![broken.url(), working.url()]);
    let body = relay
        .get(&format!("{DELIVERED_PATH}?limit=1"))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed[0]["slot"], "100");
    assert!(relay.health_status().healthy);
    broken_mock.assert_async().await;
    working_mock.assert_async().await;
}

#[tokio::test]
async fn total_failure_installs_a_negative_cache_entry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .with_body("broken")
        .expect(1)
        .create_async()
        .await;

    let relay = relay_client(vec![server.url()]);
    let path = format!("{DELIVERED_PATH}?limit=5");
    let first = relay.get(&path).await.unwrap_err();
    assert!(matches!(first, RelayError::AllFailed { .. }));

    // The second call must not touch the network: the single expected hit
    // above is the proof.
    let second = relay.get(&path).await.unwrap_err();
    assert!(matches!(second, RelayError::Backoff));
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_bodies_count_as_failures() {
    let mut empty = mockito::Server::new_async().await;
    let _empty_mock = empty
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("   ")
        .create_async()
        .await;

    let relay = relay_client(vec![empty.url()]);
    let err = relay
        .get(&format!("{DELIVERED_PATH}?limit=1"))
        .await
        .unwrap_err();
    match err {
        RelayError::AllFailed { last, .. } => assert!(last.contains("empty response")),
        other => panic!("expected AllFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn get_from_all_collects_every_successful_body() {
    let mut a = mockito::Server::new_async().await;
    let _ma = a
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(json!([{"block_hash": "0xaa"}]).to_string())
        .create_async()
        .await;
    let mut b = mockito::Server::new_async().await;
    let _mb = b
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(json!([{"block_hash": "0xbb"}]).to_string())
        .create_async()
        .await;

    let relay = relay_client(vec![a.url(), b.url()]);
    let bodies = relay
        .get_from_all(&format!("{DELIVERED_PATH}?limit=200"))
        .await;
    assert_eq!(bodies.len(), 2);
}

#[tokio::test]
async fn recent_slot_reads_the_first_delivered_entry() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::UrlEncoded("limit".into(), "1".into()))
        .with_status(200)
        .with_body(json!([{"slot": "7654321", "block_hash": "0xaa"}]).to_string())
        .create_async()
        .await;

    let relay = relay_client(vec![server.url()]);
    assert_eq!(relay.recent_slot().await.unwrap(), "7654321");
}

#[tokio::test]
async fn recent_slot_with_an_empty_list_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", DELIVERED_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let relay = relay_client(vec![server.url()]);
    assert!(matches!(
        relay.recent_slot().await.unwrap_err(),
        RelayError::NoSlot
    ));
}

#[tokio::test]
async fn budget_cuts_the_relay_traversal_short() {
    // Ten copies of an unroutable relay with a tiny budget: the loop must
    // give up quickly instead of walking the whole list.
    let urls: Vec<String> = (0..10).map(|_| "http://127.0.0.1:1".to_string()).collect();
    let relay = relay_client_with_budget(urls, Duration::from_millis(150));
    let started = std::time::Instant::now();
    let err = relay.get("/relay/v1/data/bidtraces/x").await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::AllFailed { .. } | RelayError::AllTimedOut(_)
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
}
