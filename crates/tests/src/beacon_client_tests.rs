use crate::common::{beacon_client, beacon_client_with_ttls};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn successful_responses_are_served_from_cache() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/eth/v1/beacon/genesis")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": {"genesis_time": "1606824023"}}).to_string())
        .expect(1)
        .create_async()
        .await;

    let beacon = beacon_client(server.url());
    let first = beacon.get("/eth/v1/beacon/genesis").await.unwrap();
    assert_eq!(first.status, 200);
    let second = beacon.get("/eth/v1/beacon/genesis").await.unwrap();
    assert_eq!(second.body, first.body);
    assert!(beacon.health_status().healthy);
    // One network hit: the second read came from the cache.
    mock.assert_async().await;
}

#[tokio::test]
async fn non_2xx_responses_are_cached_under_the_error_ttl() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/eth/v1/beacon/headers")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .with_body("overloaded")
        .expect(1)
        .create_async()
        .await;

    let beacon = beacon_client(server.url());
    let first = beacon.get("/eth/v1/beacon/headers?limit=1").await.unwrap();
    assert_eq!(first.status, 503);
    assert!(!first.is_ok());
    let status = beacon.health_status();
    assert!(!status.healthy);
    assert_eq!(status.last_error.as_deref(), Some("HTTP 503"));

    // Second call inside the error TTL is a cache hit.
    let second = beacon.get("/eth/v1/beacon/headers?limit=1").await.unwrap();
    assert_eq!(second.status, 503);
    mock.assert_async().await;
}

#[tokio::test]
async fn error_entries_expire_faster_than_ok_entries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/eth/v1/beacon/genesis")
        .with_status(500)
        .with_body("boom")
        .expect(2)
        .create_async()
        .await;

    let beacon = beacon_client_with_ttls(
        server.url(),
        Duration::from_secs(60),
        Duration::from_millis(50),
    );
    let _ = beacon.get("/eth/v1/beacon/genesis").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // The error entry has aged out, so this goes back to the network.
    let _ = beacon.get("/eth/v1/beacon/genesis").await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn get_json_filters_out_error_responses() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/eth/v1/beacon/states/finalized/finality_checkpoints")
        .with_status(429)
        .with_body(json!({"message": "rate limited"}).to_string())
        .create_async()
        .await;

    let beacon = beacon_client(server.url());
    let parsed = beacon
        .get_json("/eth/v1/beacon/states/finalized/finality_checkpoints")
        .await;
    assert!(parsed.is_none());
}

#[tokio::test]
async fn check_health_probes_the_headers_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/eth/v1/beacon/headers")
        .match_query(mockito::Matcher::UrlEncoded("limit".into(), "1".into()))
        .with_status(200)
        .with_body(json!({"data": []}).to_string())
        .create_async()
        .await;

    let beacon = beacon_client(server.url());
    let status = beacon.check_health().await;
    assert!(status.healthy);
    assert_eq!(status.name, "beacon");
}
