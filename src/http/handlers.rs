//! Wire-format handlers (spec.md §6), in the style of `tao_interface.rs`'s
//! `State`/`Path`/`Query`-extracting handler functions returning
//! `AppResult<Json<Value>>`.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::document::Document;
use crate::error::{AppError, AppResult};
use crate::http::DatastoreRegistry;
use crate::json_codec::{decode_document_value, encode_document};

fn ensure_datastore_known(registry: &DatastoreRegistry, ds: &str) -> AppResult<()> {
    if registry.list().iter().any(|(name, _)| name == ds) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("unknown datastore {ds}")))
    }
}

fn resolve(
    registry: &DatastoreRegistry,
    ds: &str,
    doc_type: &str,
) -> AppResult<std::sync::Arc<dyn crate::datastore::Datastore>> {
    ensure_datastore_known(registry, ds)?;
    registry
        .get(ds, doc_type)
        .ok_or_else(|| AppError::Forbidden(format!("unknown document type {doc_type} on datastore {ds}")))
}

pub async fn list_datastores(State(registry): State<DatastoreRegistry>) -> Json<Value> {
    let entries: Vec<Value> = registry
        .list()
        .into_iter()
        .map(|(name, id)| json!({"id": id, "name": name}))
        .collect();
    Json(json!(entries))
}

#[derive(Debug, Deserialize)]
pub struct GetDocQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn get_document(
    State(registry): State<DatastoreRegistry>,
    Path((ds, doc_type, id)): Path<(String, String, String)>,
    Query(q): Query<GetDocQuery>,
) -> AppResult<Json<Value>> {
    let datastore = resolve(&registry, &ds, &doc_type)?;
    let doc = datastore
        .get(&id, q.include_deleted)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::Forbidden(format!("unknown document {id}")))?;
    Ok(Json(serde_json::from_str(&encode_document(&doc)).unwrap_or(json!({}))))
}

#[derive(Debug, Deserialize)]
pub struct PutDocQuery {
    #[serde(default)]
    pub increment_rev: bool,
}

pub async fn put_document(
    State(registry): State<DatastoreRegistry>,
    Path((ds, doc_type)): Path<(String, String)>,
    Query(q): Query<PutDocQuery>,
    body: String,
) -> AppResult<Json<Value>> {
    let datastore = resolve(&registry, &ds, &doc_type)?;
    let doc = parse_document(&body)?;
    let result = datastore.put(doc, q.increment_rev).await.map_err(AppError::from)?;
    Ok(Json(json!({
        "num_docs_put": result.accepted,
        "document": serde_json::from_str::<Value>(&encode_document(&result.document)).unwrap_or(json!({})),
    })))
}

#[derive(Debug, Deserialize)]
pub struct DocsSinceQuery {
    #[serde(default)]
    pub start_sequence_id: i64,
    pub chunk_size: Option<u32>,
}

pub async fn get_docs_since(
    State(registry): State<DatastoreRegistry>,
    Path((ds, doc_type)): Path<(String, String)>,
    Query(q): Query<DocsSinceQuery>,
) -> AppResult<Json<Value>> {
    let datastore = resolve(&registry, &ds, &doc_type)?;
    let chunk_size = q.chunk_size.unwrap_or(100);
    let (seq, docs) = datastore
        .get_docs_since(q.start_sequence_id, chunk_size)
        .await
        .map_err(AppError::from)?;
    let documents: Vec<Value> = docs
        .iter()
        .map(|d| serde_json::from_str(&encode_document(d)).unwrap_or(json!({})))
        .collect();
    Ok(Json(json!({"current_sequence_id": seq, "documents": documents})))
}

pub async fn put_documents(
    State(registry): State<DatastoreRegistry>,
    Path((ds, doc_type)): Path<(String, String)>,
    Query(q): Query<PutDocQuery>,
    Json(body): Json<Vec<Value>>,
) -> AppResult<Json<Value>> {
    let datastore = resolve(&registry, &ds, &doc_type)?;
    let mut num_docs_put = 0u32;
    let mut documents = Vec::with_capacity(body.len());
    for value in body {
        let doc = decode_document_value(value, None).map_err(AppError::from)?;
        let result = datastore.put(doc, q.increment_rev).await.map_err(AppError::from)?;
        num_docs_put += result.accepted;
        documents.push(serde_json::from_str::<Value>(&encode_document(&result.document)).unwrap_or(json!({})));
    }
    Ok(Json(json!({"num_docs_put": num_docs_put, "documents": documents})))
}

fn parse_document(body: &str) -> AppResult<Document> {
    decode_document_value(serde_json::from_str(body).map_err(|e| {
        AppError::UnprocessableEntity(format!("invalid JSON body: {e}"))
    })?, None)
    .map_err(AppError::from)
}
