//! In-process scenario tests for tmm-daemon HTTP plumbing.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot`, no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tmm_config::{sha256_hex, ApiToken, AppConfig};
use tmm_daemon::{auth::StaticTokenResolver, routes, state};
use tmm_db::{CounterLedger, MemStore};
use tower::ServiceExt; // oneshot
use uuid::Uuid;

const TOKEN: &str = "test-token-1";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state(config: AppConfig) -> Arc<state::AppState> {
    let tokens = vec![ApiToken {
        user_id: Uuid::new_v4(),
        token_sha256: sha256_hex(TOKEN.as_bytes()),
    }];
    Arc::new(state::AppState::new(
        CounterLedger::new(Arc::new(MemStore::new())),
        Arc::new(config),
        Arc::new(StaticTokenResolver::new(tokens)),
    ))
}

fn make_router() -> axum::Router {
    routes::build_router(make_state(AppConfig::default()))
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str, token: Option<&str>) -> Request<axum::body::Body> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(axum::body::Body::empty()).unwrap()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public_and_names_backend() {
    let (status, body) = call(make_router(), get("/v1/health", None)).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "tmm-daemon");
    assert_eq!(json["backend"], "memory");
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn api_requires_bearer_token() {
    let (status, body) = call(make_router(), get("/api/tools", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json = parse_json(body);
    assert_eq!(json["error"], "UNAUTHORIZED");
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn wrong_token_is_rejected() {
    let (status, _) = call(make_router(), get("/api/tools", Some("not-the-token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stream_requires_bearer_token() {
    let (status, _) = call(make_router(), get("/v1/stream", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_lists_tools() {
    let (status, body) = call(make_router(), get("/api/tools", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body), serde_json::json!([]));
}

// ---------------------------------------------------------------------------
// Prefix + malformed input
// ---------------------------------------------------------------------------

#[tokio::test]
async fn api_prefix_is_configurable() {
    let mut cfg = AppConfig::default();
    cfg.service.api_prefix = "/".to_string();
    let router = routes::build_router(make_state(cfg));

    let (status, _) = call(router.clone(), get("/tools", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(router, get("/api/tools", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_path_id_is_json_400() {
    let (status, body) = call(make_router(), get("/api/tools/not-a-uuid", Some(TOKEN))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn unknown_tool_is_json_404() {
    let uri = format!("/api/tools/{}", Uuid::new_v4());
    let (status, body) = call(make_router(), get(&uri, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["error"], "NOT_FOUND");
}
