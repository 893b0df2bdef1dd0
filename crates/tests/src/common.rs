//! Shared helpers for building clients against mock upstream servers.

use blockfuse_core::config::{BeaconConfig, ElConfig, RelayConfig};
use blockfuse_core::upstream::beacon::BeaconClient;
use blockfuse_core::upstream::el::ElClient;
use blockfuse_core::upstream::relay::RelayClient;
use std::sync::Arc;
use std::time::Duration;

pub fn el_client(providers: Vec<String>) -> Arc<ElClient> {
    Arc::new(
        ElClient::new(&ElConfig {
            providers,
            ws_url: String::new(),
            timeout: Duration::from_secs(2),
        })
        .expect("el client should build"),
    )
}

pub fn beacon_client(base_url: String) -> Arc<BeaconClient> {
    beacon_client_with_ttls(base_url, Duration::from_secs(20), Duration::from_secs(10))
}

pub fn beacon_client_with_ttls(
    base_url: String,
    ok_ttl: Duration,
    err_ttl: Duration,
) -> Arc<BeaconClient> {
    Arc::new(
        BeaconClient::new(&BeaconConfig {
            base_url,
            timeout: Duration::from_secs(2),
            ok_ttl,
            err_ttl,
        })
        .expect("beacon client should build"),
    )
}

pub fn relay_client(urls: Vec<String>) -> Arc<RelayClient> {
    relay_client_with_budget(urls, Duration::from_millis(2_500))
}

pub fn relay_client_with_budget(urls: Vec<String>, budget: Duration) -> Arc<RelayClient> {
    Arc::new(
        RelayClient::new(&RelayConfig {
            urls,
            timeout: Duration::from_secs(2),
            budget,
            ok_ttl: Duration::from_secs(20),
            err_ttl: Duration::from_secs(10),
        })
        .expect("relay client should build"),
    )
}

/// A server that accepts connections and never responds, for exercising
/// deadline behavior.
pub async fn hanging_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind hanging server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _hold = socket;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    format!("http://{addr}")
}
