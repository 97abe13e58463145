//! Exercises the HTTP wire format from spec.md §6 end-to-end against an
//! in-memory datastore, using `tower::ServiceExt::oneshot` instead of a
//! bound socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use reldatasync::datastore::memory::MemoryBackend;
use reldatasync::datastore::Store;
use reldatasync::http::{build_router, DatastoreRegistry};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    let registry = DatastoreRegistry::builder()
        .register("default", "widgets", Arc::new(Store::new(MemoryBackend::new("r1", "default"))))
        .build();
    build_router(registry)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn unknown_datastore_is_404_on_doc_get() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/nope/widgets/doc/a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_document_type_is_403() {
    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/default/gizmos/doc/a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn put_then_get_round_trips_over_http() {
    let app = app();
    let put_body = json!({"_id": "a", "name": "gizmo"}).to_string();
    let put_resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/default/widgets/doc?increment_rev=true")
                .header("content-type", "application/json")
                .body(Body::from(put_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(put_resp.status(), StatusCode::OK);
    let put_json = body_json(put_resp).await;
    assert_eq!(put_json["num_docs_put"], 1);

    let get_resp = app
        .oneshot(Request::builder().uri("/default/widgets/doc/a").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get_resp.status(), StatusCode::OK);
    let doc = body_json(get_resp).await;
    assert_eq!(doc["_id"], "a");
    assert_eq!(doc["name"], "gizmo");
}

#[tokio::test]
async fn invalid_body_is_422() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/default/widgets/doc")
                .header("content-type", "application/json")
                .body(Body::from("{\"name\":\"no id\"}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
