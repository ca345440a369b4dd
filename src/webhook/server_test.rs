//! Tests for the webhook endpoint
//!
//! The handler is exercised directly as a function; the signature gate must
//! hold before any event context is constructed.

use super::*;
use crate::metrics::create_metrics;
use crate::webhook::handlers::ServerConfig;
use crate::webhook::signature::sign;
use axum::http::HeaderValue;

fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        config: ServerConfig {
            webhook_secret: "hunter2".to_string(),
            github_token: "unused".to_string(),
            env: None,
            logs_url: None,
            automerge: false,
            green_ci_required: false,
            review_required: false,
            cluster_dir: "clusters".to_string(),
            strict_check: false,
        },
        locker: None,
        store: None,
        metrics: create_metrics().unwrap(),
    })
}

fn signed_headers(kind: &str, body: &[u8], secret: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(EVENT_HEADER, HeaderValue::from_str(kind).unwrap());
    headers.insert(
        SIGNATURE_HEADER,
        HeaderValue::from_str(&sign(body, secret)).unwrap(),
    );
    headers
}

#[tokio::test]
async fn test_bad_signature_is_403() {
    let state = test_state();
    let body = Bytes::from_static(b"{}");
    let headers = signed_headers("pull_request", b"{}", "wrong-secret");

    let (status, text) = webhook(State(state), headers, body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(text, "signature mismatch");
}

#[tokio::test]
async fn test_missing_signature_is_403() {
    let state = test_state();
    let mut headers = HeaderMap::new();
    headers.insert(EVENT_HEADER, HeaderValue::from_static("pull_request"));

    let (status, _) = webhook(State(state), headers, Bytes::from_static(b"{}")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unrecognized_event_is_200_non_matching() {
    let state = test_state();
    let body = b"{\"action\":\"published\"}";
    let headers = signed_headers("release", body, "hunter2");

    let (status, text) = webhook(State(state), headers, Bytes::from_static(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Non-matching event");
}

#[tokio::test]
async fn test_ignored_pull_request_action_is_200() {
    let body = br#"{
        "action": "closed",
        "pull_request": {
            "number": 3,
            "head": {"ref": "b", "sha": "abc"},
            "base": {"ref": "master", "sha": "def"}
        },
        "repository": {"name": "r", "full_name": "o/r"}
    }"#;
    let state = test_state();
    let headers = signed_headers("pull_request", body, "hunter2");

    let (status, text) = webhook(State(state), headers, Bytes::from_static(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("Ignoring pull_request action closed"));
}

#[tokio::test]
async fn test_unparsable_recognized_event_is_500() {
    let state = test_state();
    let body = b"{}";
    let headers = signed_headers("pull_request", body, "hunter2");

    let (status, text) = webhook(State(state.clone()), headers, Bytes::from_static(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "internal error");
}
