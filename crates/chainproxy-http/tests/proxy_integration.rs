//! End-to-end tests: RequestRouter + HttpProvider against mockito upstreams.

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::{HeaderMap, StatusCode};
use mockito::{Mock, Server, ServerGuard};
use serde_json::{json, Value};

use chainproxy_core::{InboundRequest, MethodMapping, ProxyConfig, RequestRouter};
use chainproxy_http::{build_router, server};

async fn upstream() -> ServerGuard {
    Server::new_async().await
}

async fn ok_mock(server: &mut ServerGuard, result: &str, hits: usize) -> Mock {
    server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
        .expect(hits)
        .create_async()
        .await
}

async fn failing_mock(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", "/")
        .with_status(502)
        .with_body("bad gateway")
        .expect(hits)
        .create_async()
        .await
}

fn config(providers: &[&ServerGuard], retry_limit: i64) -> ProxyConfig {
    ProxyConfig {
        providers: providers.iter().map(|s| s.url()).collect(),
        retry_limit,
        ..ProxyConfig::default()
    }
}

fn router(config: &ProxyConfig) -> RequestRouter {
    config.validate().unwrap();
    build_router(config).unwrap()
}

fn inbound(body: Value) -> InboundRequest {
    InboundRequest {
        headers: HeaderMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

fn parse(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn fails_over_to_third_provider() {
    let (mut p1, mut p2, mut p3) = (upstream().await, upstream().await, upstream().await);
    let m1 = failing_mock(&mut p1, 1).await;
    let m2 = failing_mock(&mut p2, 1).await;
    let m3 = ok_mock(&mut p3, "0x3", 1).await;

    let router = router(&config(&[&p1, &p2, &p3], 5));
    let resp = router
        .handle_inbound(inbound(json!({"jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber"})))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(parse(&resp.body)["result"], "0x3");
    m1.assert_async().await;
    m2.assert_async().await;
    m3.assert_async().await;
}

#[tokio::test]
async fn retry_limit_one_gives_up_after_first_provider() {
    let (mut p1, mut p2, mut p3) = (upstream().await, upstream().await, upstream().await);
    let m1 = failing_mock(&mut p1, 1).await;
    let m2 = ok_mock(&mut p2, "0x2", 0).await;
    let m3 = ok_mock(&mut p3, "0x3", 0).await;

    let router = router(&config(&[&p1, &p2, &p3], 1));
    let resp = router
        .handle_inbound(inbound(json!({"jsonrpc": "2.0", "id": 7, "method": "eth_call"})))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = parse(&resp.body);
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], -32603);
    assert!(body["error"]["message"].as_str().unwrap().contains("HTTP 502"));
    m1.assert_async().await;
    m2.assert_async().await;
    m3.assert_async().await;
}

#[tokio::test]
async fn execution_reverted_does_not_fail_over() {
    let (mut p1, mut p2) = (upstream().await, upstream().await);
    let reverted = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {"code": 3, "message": "execution reverted", "data": "0x"}
    });
    let m1 = p1
        .mock("POST", "/")
        .with_status(200)
        .with_body(reverted.to_string())
        .expect(1)
        .create_async()
        .await;
    let m2 = ok_mock(&mut p2, "0x2", 0).await;

    let router = router(&config(&[&p1, &p2], 3));
    let resp = router
        .handle_inbound(inbound(json!({"jsonrpc": "2.0", "id": 1, "method": "eth_call"})))
        .await;

    assert_eq!(parse(&resp.body), reverted);
    m1.assert_async().await;
    m2.assert_async().await;
}

#[tokio::test]
async fn pinned_method_never_touches_default_pool() {
    let (mut p1, mut p2, mut p3, mut p4) =
        (upstream().await, upstream().await, upstream().await, upstream().await);
    let m1 = ok_mock(&mut p1, "0x1", 0).await;
    let m2 = ok_mock(&mut p2, "0x2", 0).await;
    let m3 = ok_mock(&mut p3, "0x3", 0).await;
    let m4 = ok_mock(&mut p4, "logs", 4).await;

    let mut config = config(&[&p1, &p2, &p3], 3);
    config.methods_mapping = vec![MethodMapping {
        method: "eth_getLogs".into(),
        providers: vec![p4.url()],
    }];
    let router = router(&config);

    for id in 0..4 {
        let resp = router
            .handle_inbound(inbound(json!({"jsonrpc": "2.0", "id": id, "method": "eth_getLogs", "params": [{}]})))
            .await;
        assert_eq!(parse(&resp.body)["result"], "logs");
    }
    m1.assert_async().await;
    m2.assert_async().await;
    m3.assert_async().await;
    m4.assert_async().await;
}

#[tokio::test]
async fn batch_with_unknown_method_reassembles_in_order() {
    let (mut pinned, mut default) = (upstream().await, upstream().await);
    let m_pinned = ok_mock(&mut pinned, "0xcall", 1).await;
    let m_default = failing_mock(&mut default, 2).await;

    let mut config = config(&[&default], 2);
    config.methods_mapping = vec![MethodMapping {
        method: "eth_call".into(),
        providers: vec![pinned.url()],
    }];
    let router = router(&config);

    let resp = router
        .handle_inbound(inbound(json!([
            {"jsonrpc": "2.0", "id": 1, "method": "eth_call"},
            {"jsonrpc": "2.0", "id": 2, "method": "unknown_method"}
        ])))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = parse(&resp.body);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["result"], "0xcall");
    assert_eq!(items[1]["id"], 2);
    assert!(items[1]["error"].is_object());
    m_pinned.assert_async().await;
    m_default.assert_async().await;
}

#[tokio::test]
async fn gzip_upstream_through_listener() {
    let mut p1 = upstream().await;
    let plain = json!({"jsonrpc": "2.0", "id": 1, "result": "0xgz"}).to_string();
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(plain.as_bytes()).unwrap();
    let m1 = p1
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-encoding", "gzip")
        .with_body(enc.finish().unwrap())
        .create_async()
        .await;

    let router = Arc::new(router(&config(&[&p1], 1)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server::serve(listener, router, async move {
        let _ = stop_rx.await;
    }));

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .header("content-type", "application/json")
        .header("accept-encoding", "gzip")
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"eth_chainId"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert!(resp.headers().get("content-encoding").is_none());
    assert_eq!(resp.text().await.unwrap(), plain);
    m1.assert_async().await;

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn listener_rejects_undecodable_payload() {
    let p1 = upstream().await;
    let router = Arc::new(router(&config(&[&p1], 1)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server::serve(listener, router, async move {
        let _ = stop_rx.await;
    }));

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .body("{oops")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
