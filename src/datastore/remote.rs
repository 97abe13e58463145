//! Remote adapter (spec.md §4.7): re-expresses the `Datastore` contract over
//! HTTP, wrapping the wire format from spec.md §6. Grounded in
//! `rds_client.py`'s `RestClientSourceDatastore`, which is constructed from
//! a base URL and a datastore/document-type pair and then handed to the
//! replicator exactly like any other datastore.
//!
//! Implements `Datastore` directly rather than going through `Store<B>`:
//! there is no raw ingest path over HTTP, `put` always goes through the
//! same `POST .../doc` route regardless of caller intent.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::datastore::{equals_no_seq_impl, Datastore, PutResult};
use crate::document::Document;
use crate::error::{DatastoreError, DatastoreResult};
use crate::json_codec::{decode_document_value, encode_document};

pub struct RemoteDatastore {
    client: Client,
    base_url: String,
    datastore_name: String,
    document_type: String,
    replica_id: String,
    /// Mirrors the base `Datastore`'s in-memory `peer_seq_ids` dict, which
    /// `RestClientSourceDatastore` inherits unmodified: peer cursors for a
    /// remote adapter live only on the local caller's side, not on the wire.
    peer_seq_ids: Mutex<HashMap<String, i64>>,
}

impl RemoteDatastore {
    /// `replica_id` here is the *local* caller's id, used only for logging
    /// and as a `Datastore::replica_id()` label — the remote replica's own
    /// identity is whatever it reports from its own storage and is never
    /// observed directly through this adapter.
    pub fn new(
        base_url: impl Into<String>,
        datastore_name: impl Into<String>,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            datastore_name: datastore_name.into(),
            document_type: document_type.into(),
            replica_id: "remote".to_string(),
            peer_seq_ids: Mutex::new(HashMap::new()),
        }
    }

    fn doc_url(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => format!(
                "{}/{}/{}/doc/{}",
                self.base_url, self.datastore_name, self.document_type, id
            ),
            None => format!("{}/{}/{}/doc", self.base_url, self.datastore_name, self.document_type),
        }
    }

    fn docs_url(&self) -> String {
        format!("{}/{}/{}/docs", self.base_url, self.datastore_name, self.document_type)
    }

    async fn map_error_response(resp: reqwest::Response) -> DatastoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        DatastoreError::Transport(format!("remote returned {status}: {body}"))
    }
}

#[async_trait]
impl Datastore for RemoteDatastore {
    fn replica_id(&self) -> &str {
        &self.replica_id
    }

    fn replica_name(&self) -> &str {
        &self.datastore_name
    }

    async fn sequence_id(&self) -> DatastoreResult<i64> {
        let (seq, _) = self.get_docs_since(i64::MAX - 1, 0).await?;
        Ok(seq)
    }

    async fn get(&self, id: &str, include_deleted: bool) -> DatastoreResult<Option<Document>> {
        let resp = self
            .client
            .get(self.doc_url(Some(id)))
            .query(&[("include_deleted", include_deleted.to_string())])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::map_error_response(resp).await);
        }
        let value: Value = resp.json().await?;
        Ok(Some(decode_document_value(value, None)?))
    }

    async fn put(&self, doc: Document, increment_rev: bool) -> DatastoreResult<PutResult> {
        let resp = self
            .client
            .post(self.doc_url(None))
            .query(&[("increment_rev", increment_rev.to_string())])
            .body(encode_document(&doc))
            .header("content-type", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::map_error_response(resp).await);
        }
        let value: Value = resp.json().await?;
        let accepted = value.get("num_docs_put").and_then(Value::as_u64).unwrap_or(0) as u32;
        let document = match value.get("document") {
            Some(d) => decode_document_value(d.clone(), None)?,
            None => doc,
        };
        Ok(PutResult { accepted, document })
    }

    async fn delete(&self, _id: &str) -> DatastoreResult<()> {
        // spec.md §4.7: the remote adapter implements get/put/get_docs_since
        // only; delete is expressed as a tombstoning `put` by callers, same
        // as every other adapter.
        Err(DatastoreError::Transport(
            "RemoteDatastore does not implement delete directly; put a tombstone instead".to_string(),
        ))
    }

    async fn get_docs_since(&self, cursor: i64, n: u32) -> DatastoreResult<(i64, Vec<Document>)> {
        let resp = self
            .client
            .get(self.docs_url())
            .query(&[("start_sequence_id", cursor.to_string()), ("chunk_size", n.to_string())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::map_error_response(resp).await);
        }
        let value: Value = resp.json().await?;
        let seq = value.get("current_sequence_id").and_then(Value::as_i64).unwrap_or(0);
        let docs = value
            .get("documents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let docs = docs
            .into_iter()
            .map(|v| decode_document_value(v, None))
            .collect::<DatastoreResult<Vec<_>>>()?;
        Ok((seq, docs))
    }

    async fn get_peer_sequence_id(&self, peer: &str) -> DatastoreResult<i64> {
        Ok(*self.peer_seq_ids.lock().unwrap().get(peer).unwrap_or(&0))
    }

    async fn set_peer_sequence_id(&self, peer: &str, seq: i64) -> DatastoreResult<()> {
        let mut peer_seq_ids = self.peer_seq_ids.lock().unwrap();
        let current = peer_seq_ids.get(peer).copied().unwrap_or(0);
        if seq < current {
            tracing::debug!(peer, seq, current, "ignoring backward peer cursor update");
            return Ok(());
        }
        peer_seq_ids.insert(peer.to_string(), seq);
        Ok(())
    }

    async fn check(&self) -> DatastoreResult<bool> {
        let (_, docs) = self.get_docs_since(-1, u32::MAX).await?;
        let seq_id = self.sequence_id().await?;
        crate::datastore::check_docs(&docs, seq_id)
    }

    async fn equals_no_seq(&self, other: &dyn Datastore, ceiling: u32) -> DatastoreResult<bool> {
        let (_, mine) = self.get_docs_since(-1, ceiling).await?;
        equals_no_seq_impl(mine, other, ceiling).await
    }
}

/// Builds the JSON request body `put`'s HTTP handler expects for a batch
/// post (`POST .../docs`), used by tests exercising the bulk route.
pub fn encode_batch(docs: &[Document]) -> Value {
    Value::Array(docs.iter().map(|d| serde_json::from_str(&encode_document(d)).unwrap_or(json!({}))).collect())
}
