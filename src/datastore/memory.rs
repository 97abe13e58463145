//! In-memory backend (spec.md §4.4). An insertion-ordered map from `_id` to
//! `Document`: every accepted put reinserts at the end, mirroring Python's
//! `OrderedDict.move_to_end`. `get_docs_since` walks in that order and can
//! short-circuit once `_seq > cursor + n` because every accepted put moves
//! the doc to the tail with a fresh, larger `_seq` — insertion order and
//! `_seq` order coincide by construction (spec.md §9 design note).

use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::datastore::Backend;
use crate::document::Document;
use crate::error::DatastoreResult;

#[derive(Default)]
struct State {
    docs: IndexMap<String, Document>,
    sequence_id: i64,
    peer_seq_ids: std::collections::HashMap<String, i64>,
}

pub struct MemoryBackend {
    replica_id: String,
    replica_name: String,
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(replica_id: impl Into<String>, replica_name: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            replica_name: replica_name.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn generated(replica_name: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string(), replica_name)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn replica_id(&self) -> &str {
        &self.replica_id
    }

    fn replica_name(&self) -> &str {
        &self.replica_name
    }

    async fn sequence_id(&self) -> DatastoreResult<i64> {
        Ok(self.state.lock().unwrap().sequence_id)
    }

    async fn bump_sequence_id(&self) -> DatastoreResult<i64> {
        let mut state = self.state.lock().unwrap();
        state.sequence_id += 1;
        Ok(state.sequence_id)
    }

    async fn get_raw(&self, id: &str) -> DatastoreResult<Option<Document>> {
        Ok(self.state.lock().unwrap().docs.get(id).cloned())
    }

    async fn put_raw(&self, doc: Document) -> DatastoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let id = doc.id().to_string();
        // Reinsert at the tail, as Python's OrderedDict.move_to_end does.
        state.docs.shift_remove(&id);
        state.docs.insert(id, doc);
        Ok(())
    }

    async fn get_docs_since_raw(&self, cursor: i64, n: u32) -> DatastoreResult<Vec<Document>> {
        let state = self.state.lock().unwrap();
        let limit = cursor + n as i64;
        let mut out = Vec::new();
        for doc in state.docs.values() {
            let seq = doc.seq().unwrap_or(0);
            if seq > limit {
                break;
            }
            if seq > cursor {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }

    async fn all_docs_raw(&self, ceiling: u32) -> DatastoreResult<Vec<Document>> {
        let state = self.state.lock().unwrap();
        Ok(state.docs.values().take(ceiling as usize).cloned().collect())
    }

    async fn get_peer_sequence_id_raw(&self, peer: &str) -> DatastoreResult<i64> {
        Ok(self.state.lock().unwrap().peer_seq_ids.get(peer).copied().unwrap_or(0))
    }

    async fn set_peer_sequence_id_raw(&self, peer: &str, seq: i64) -> DatastoreResult<()> {
        self.state.lock().unwrap().peer_seq_ids.insert(peer.to_string(), seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{Datastore, Store};

    #[tokio::test]
    async fn empty_replica_reports_zero_and_empty_batch() {
        let ds = Store::new(MemoryBackend::new("r1", "r1"));
        let (seq, docs) = ds.get_docs_since(0, 10).await.unwrap();
        assert_eq!(seq, 0);
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn cursor_at_or_past_sequence_id_returns_empty() {
        let ds = Store::new(MemoryBackend::new("r1", "r1"));
        ds.put(Document::new("a"), true).await.unwrap();
        let seq_id = ds.sequence_id().await.unwrap();
        let (seq, docs) = ds.get_docs_since(seq_id, 10).await.unwrap();
        assert_eq!(seq, seq_id);
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn move_to_end_preserves_seq_order_invariant() {
        let ds = Store::new(MemoryBackend::new("r1", "r1"));
        ds.put(Document::new("a"), true).await.unwrap();
        ds.put(Document::new("b"), true).await.unwrap();
        // Re-putting "a" with increment_rev moves it to the tail with a new,
        // larger _seq, so get_docs_since's short-circuit remains valid.
        ds.put(Document::new("a"), true).await.unwrap();
        let (_, docs) = ds.get_docs_since(0, 10).await.unwrap();
        let seqs: Vec<i64> = docs.iter().map(|d| d.seq().unwrap()).collect();
        let mut sorted = seqs.clone();
        sorted.sort();
        assert_eq!(seqs, sorted);
    }
}
