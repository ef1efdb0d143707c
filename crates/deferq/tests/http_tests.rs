//! Delivery endpoint tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use deferq::{
    delivery_routes, task_fn, DispatchHandler, Namespace, PathResolver, TaskError,
};

fn app(counter: Arc<AtomicU32>) -> axum::Router {
    let mut resolver = PathResolver::new();
    resolver
        .register_module(
            "jobs",
            Namespace::new()
                .task(
                    "count",
                    task_fn(move |_, _| {
                        let counter = counter.clone();
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                )
                .task(
                    "fail",
                    task_fn(|_, _| async { Err(TaskError::Failed("nope".into())) }),
                ),
        )
        .unwrap();

    let handler = Arc::new(DispatchHandler::new(Arc::new(resolver)));
    delivery_routes(handler, "/_ah/queue/deferred")
}

fn delivery(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/_ah/queue/deferred/count")
        .header("content-type", "application/octet-stream")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_delivery_runs_task() {
    let counter = Arc::new(AtomicU32::new(0));
    let body = serde_json::to_vec(&json!({"path": "jobs.count", "args": [], "kwargs": {}})).unwrap();

    let response = app(counter.clone()).oneshot(delivery(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "accepted");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_path_is_bad_request() {
    let counter = Arc::new(AtomicU32::new(0));
    let body = serde_json::to_vec(&json!({"path": ""})).unwrap();

    let response = app(counter.clone()).oneshot(delivery(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "MISSING_PATH");
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_path_is_bad_request() {
    let body = serde_json::to_vec(&json!({"path": "jobs.nope"})).unwrap();
    let response = app(Arc::default()).oneshot(delivery(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "INVALID_PATH");
}

#[tokio::test]
async fn test_garbage_body_is_bad_request() {
    let response = app(Arc::default())
        .oneshot(delivery("definitely not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_task_failure_is_server_error() {
    let body = serde_json::to_vec(&json!({"path": "jobs.fail"})).unwrap();
    let response = app(Arc::default()).oneshot(delivery(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"]["code"], "TASK_FAILED");
    assert!(!json["error"]["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_get_is_not_routed() {
    let response = app(Arc::default())
        .oneshot(
            Request::builder()
                .uri("/_ah/queue/deferred/count")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
