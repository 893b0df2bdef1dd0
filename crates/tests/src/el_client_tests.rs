use crate::common::el_client;
use blockfuse_core::upstream::el::ElError;
use serde_json::json;

#[tokio::test]
async fn single_provider_returns_the_raw_result() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"}).to_string())
        .create_async()
        .await;

    let el = el_client(vec![server.url()]);
    let result = el.call("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(result, json!("0x10"));
    assert!(el.health_status().healthy);
    mock.assert_async().await;
}

#[tokio::test]
async fn enveloped_rpc_errors_surface_the_message() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": null,
                "error": {"code": -32000, "message": "header not found"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let el = el_client(vec![server.url()]);
    let err = el
        .call("eth_getBlockByNumber", json!(["0x999999", true]))
        .await
        .unwrap_err();
    assert!(matches!(err, ElError::Rpc { code: -32000, .. }));
    assert_eq!(err.to_string(), "header not found");
    assert!(!el.health_status().healthy);
}

#[tokio::test]
async fn bare_rate_limit_bodies_are_recognized() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({"code": -32005, "message": "Too Many Requests"}).to_string())
        .create_async()
        .await;

    let el = el_client(vec![server.url()]);
    let err = el.call("eth_blockNumber", json!([])).await.unwrap_err();
    assert_eq!(err.to_string(), "rpc error -32005: Too Many Requests");
}

#[tokio::test]
async fn null_results_are_a_distinct_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": null}).to_string())
        .create_async()
        .await;

    let el = el_client(vec![server.url()]);
    let err = el
        .call("eth_getTransactionByHash", json!(["0xmissing"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ElError::NullResult));
    assert_eq!(err.to_string(), "rpc returned null result");
}

#[tokio::test]
async fn race_returns_the_first_successful_leg() {
    let mut failing = mockito::Server::new_async().await;
    let _bad = failing
        .mock("POST", "/")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let mut healthy = mockito::Server::new_async().await;
    let _good = healthy
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": "0x42"}).to_string())
        .create_async()
        .await;

    let el = el_client(vec![failing.url(), healthy.url()]);
    let result = el.call("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(result, json!("0x42"));
    assert!(el.health_status().healthy);
}

#[tokio::test]
async fn race_with_no_successful_leg_reports_the_last_error() {
    let mut a = mockito::Server::new_async().await;
    let _ma = a
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": null}).to_string())
        .create_async()
        .await;
    let mut b = mockito::Server::new_async().await;
    let _mb = b
        .mock("POST", "/")
        .with_status(200)
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": null}).to_string())
        .create_async()
        .await;

    let el = el_client(vec![a.url(), b.url()]);
    let err = el.call("eth_blockNumber", json!([])).await.unwrap_err();
    assert!(matches!(err, ElError::NullResult));
    assert!(!el.health_status().healthy);
}
