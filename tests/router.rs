//! In-process tests driving the layered router directly.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use edge_gateway::config::GatewayConfig;
use edge_gateway::HttpServer;

fn server() -> HttpServer {
    let mut config = GatewayConfig::default();
    for service in &mut config.services {
        service.url = "http://127.0.0.1:1".into();
    }
    HttpServer::new(config)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unknown_route_has_request_id() {
    let response = server()
        .router()
        .oneshot(Request::get("/foo/bar").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let response = server()
        .router()
        .oneshot(
            Request::get("/status")
                .header("x-request-id", "trace-me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_status_and_breaker_status() {
    let server = server();

    let response = server
        .router()
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = json_body(response).await;
    assert_eq!(status["status"], "operational");
    assert_eq!(status["services"], 2);

    let response = server
        .router()
        .oneshot(Request::get("/breaker-status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let report = json_body(response).await;
    for service in ["user", "competition"] {
        let breaker = &report["breakers"][service];
        assert_eq!(breaker["state"], "CLOSED");
        assert_eq!(breaker["failure_count"], 0);
        assert_eq!(breaker["success_count"], 0);
        assert_eq!(breaker["reroute_count"], 0);
        assert!(breaker["last_state_change_ms"].is_u64());
    }
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = GatewayConfig::default();
    config.limits.max_body_bytes = 16;
    let response = HttpServer::new(config)
        .router()
        .oneshot(
            Request::post("/user/login")
                .header("content-length", "64")
                .body(Body::from(vec![b'a'; 64]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
