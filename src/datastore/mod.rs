//! The datastore contract (spec.md §4.3). A `Datastore` is a replica: an
//! owned `replica_id`, a local sequence counter, a document table and a
//! per-peer cursor map. The algorithmic layer (version comparison,
//! accept/ignore decisions, tombstoning, `check`, `equals_no_seq`) is
//! identical across every storage engine, so it lives once on `Store<B>`
//! against a small `Backend` surface — mirroring how `DatabaseInterface` in
//! the teacher crate separates "raw SQL operations" from the
//! algorithm built on top, except here the algorithm itself (not just the
//! SQL) is the shared part.

pub mod memory;
pub mod postgres;
pub mod remote;
pub mod sql;
pub mod sqlite;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::document::{Document, ID, REV, SEQ};
use crate::error::{DatastoreError, DatastoreResult};
use crate::vector_clock::VectorClock;

/// Outcome of a `put`: how many documents were newly accepted (0 or 1) and
/// the document as it now stands (stored, if accepted; as given, if not).
#[derive(Debug, Clone)]
pub struct PutResult {
    pub accepted: u32,
    pub document: Document,
}

/// The public replica contract every transport adapter exposes. Implemented
/// generically by `Store<B: Backend>` for the in-process backends, and
/// directly by `RemoteDatastore` since the HTTP adapter has no `_put`/raw
/// ingest path of its own (spec.md §4.7).
#[async_trait]
pub trait Datastore: Send + Sync {
    fn replica_id(&self) -> &str;
    fn replica_name(&self) -> &str;

    async fn sequence_id(&self) -> DatastoreResult<i64>;

    async fn get(&self, id: &str, include_deleted: bool) -> DatastoreResult<Option<Document>>;

    async fn put(&self, doc: Document, increment_rev: bool) -> DatastoreResult<PutResult>;

    async fn delete(&self, id: &str) -> DatastoreResult<()>;

    async fn get_docs_since(&self, cursor: i64, n: u32) -> DatastoreResult<(i64, Vec<Document>)>;

    async fn get_peer_sequence_id(&self, peer: &str) -> DatastoreResult<i64>;

    async fn set_peer_sequence_id(&self, peer: &str, seq: i64) -> DatastoreResult<()>;

    /// Diagnostic health probe (spec.md §4.3). Never fails; logs each
    /// violation at `warn` and returns `false` only once all documents have
    /// been scanned.
    async fn check(&self) -> DatastoreResult<bool>;

    /// Compares two replicas' full document sets ignoring `_seq`, per
    /// spec.md §4.3. `ceiling` bounds how many documents are pulled from
    /// each side (protects tests/CLI against unbounded scans).
    async fn equals_no_seq(&self, other: &dyn Datastore, ceiling: u32) -> DatastoreResult<bool>;
}

/// Low-level primitives a concrete storage engine provides. `Store<B>`
/// implements the shared algorithm against this surface exactly once, the
/// way `DatabaseInterface` separates raw queries from higher-level TAO
/// operations in the teacher crate.
#[async_trait]
pub trait Backend: Send + Sync {
    fn replica_id(&self) -> &str;
    fn replica_name(&self) -> &str;

    /// Current `sequence_id` (max `_seq` ever assigned).
    async fn sequence_id(&self) -> DatastoreResult<i64>;

    /// Atomically bumps and returns the new `sequence_id`.
    async fn bump_sequence_id(&self) -> DatastoreResult<i64>;

    /// Raw fetch, tombstones included.
    async fn get_raw(&self, id: &str) -> DatastoreResult<Option<Document>>;

    /// Persists `doc` verbatim (insert or full overwrite keyed by `_id`).
    async fn put_raw(&self, doc: Document) -> DatastoreResult<()>;

    /// Raw range scan, tombstones included, ascending `_seq`.
    async fn get_docs_since_raw(&self, cursor: i64, n: u32) -> DatastoreResult<Vec<Document>>;

    /// Full scan up to `ceiling` documents, used only by `equals_no_seq`.
    async fn all_docs_raw(&self, ceiling: u32) -> DatastoreResult<Vec<Document>>;

    async fn get_peer_sequence_id_raw(&self, peer: &str) -> DatastoreResult<i64>;
    async fn set_peer_sequence_id_raw(&self, peer: &str, seq: i64) -> DatastoreResult<()>;
}

/// Generic wrapper implementing `Datastore` once against any `Backend`.
pub struct Store<B: Backend> {
    backend: B,
}

impl<B: Backend> Store<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// `new_rev_and_seq` (spec.md §4.3): bumps `sequence_id`, sets this
    /// replica's clock entry to the new value on top of `existing_rev_str`
    /// (or an empty clock), returns the stringified clock and the new seq.
    /// A helper for framework adapters that persist through a native ORM
    /// instead of calling `put` directly.
    pub async fn new_rev_and_seq(&self, existing_rev_str: Option<&str>) -> DatastoreResult<(String, i64)> {
        let mut clock = match existing_rev_str {
            Some(s) => VectorClock::from_string(s)?,
            None => VectorClock::new(),
        };
        let new_seq = self.backend.bump_sequence_id().await?;
        clock.set(self.backend.replica_id(), new_seq as u64)?;
        Ok((clock.to_canonical_string(), new_seq))
    }
}

fn parse_rev(doc: &Document) -> DatastoreResult<VectorClock> {
    match doc.rev() {
        Some(s) => VectorClock::from_string(s),
        None => Ok(VectorClock::new()),
    }
}

#[async_trait]
impl<B: Backend> Datastore for Store<B> {
    fn replica_id(&self) -> &str {
        self.backend.replica_id()
    }

    fn replica_name(&self) -> &str {
        self.backend.replica_name()
    }

    async fn sequence_id(&self) -> DatastoreResult<i64> {
        self.backend.sequence_id().await
    }

    async fn get(&self, id: &str, include_deleted: bool) -> DatastoreResult<Option<Document>> {
        let doc = self.backend.get_raw(id).await?;
        Ok(match doc {
            Some(d) if d.deleted() && !include_deleted => None,
            other => other,
        })
    }

    async fn put(&self, mut doc: Document, increment_rev: bool) -> DatastoreResult<PutResult> {
        if !doc.contains_key(ID) {
            return Err(DatastoreError::InvalidDocument(
                "put: document missing _id".to_string(),
            ));
        }
        if !increment_rev && doc.rev().is_none() {
            return Err(DatastoreError::InvalidDocument(
                "put: _rev required when increment_rev is false".to_string(),
            ));
        }

        let id = doc.id().to_string();
        let existing = self.backend.get_raw(&id).await?;

        let provisional_seq = self.backend.sequence_id().await? + 1;
        let mut candidate = parse_rev(&doc)?;
        if increment_rev {
            candidate.set(self.backend.replica_id(), provisional_seq as u64)?;
        }

        let existing_clock = match &existing {
            Some(e) => Some(parse_rev(e)?),
            None => None,
        };

        let accepted = match &existing_clock {
            None => true,
            Some(existing_clock) => *existing_clock < candidate,
        };

        if !accepted {
            debug!(id = %id, "put ignored: candidate clock does not dominate existing");
            return Ok(PutResult { accepted: 0, document: doc });
        }

        let new_seq = self.backend.bump_sequence_id().await?;
        if increment_rev {
            let mut final_clock = parse_rev(&doc)?;
            final_clock.set(self.backend.replica_id(), new_seq as u64)?;
            doc.set_rev(final_clock.to_canonical_string());
        }
        doc.set_seq(new_seq);

        if increment_rev {
            if let Some(existing_clock) = &existing_clock {
                let persisted = parse_rev(&doc)?;
                if !(persisted > *existing_clock) {
                    return Err(DatastoreError::NonMonotonic(format!(
                        "accepted authoring put for {id} did not strictly increase _rev"
                    )));
                }
            }
        }

        self.backend.put_raw(doc.clone()).await?;
        debug!(id = %id, seq = new_seq, "put accepted");
        Ok(PutResult { accepted: 1, document: doc })
    }

    async fn delete(&self, id: &str) -> DatastoreResult<()> {
        let existing = self.backend.get_raw(id).await?;
        let mut doc = match existing {
            Some(d) if !d.deleted() => d,
            _ => return Ok(()),
        };

        let new_seq = self.backend.bump_sequence_id().await?;
        let mut clock = parse_rev(&doc)?;
        clock.set(self.backend.replica_id(), new_seq as u64)?;
        doc.set_rev(clock.to_canonical_string());
        doc.set_seq(new_seq);
        doc.set_deleted(true);
        self.backend.put_raw(doc).await?;
        debug!(id, seq = new_seq, "document tombstoned");
        Ok(())
    }

    async fn get_docs_since(&self, cursor: i64, n: u32) -> DatastoreResult<(i64, Vec<Document>)> {
        let docs = self.backend.get_docs_since_raw(cursor, n).await?;
        let seq_id = self.backend.sequence_id().await?;
        Ok((seq_id, docs))
    }

    async fn get_peer_sequence_id(&self, peer: &str) -> DatastoreResult<i64> {
        self.backend.get_peer_sequence_id_raw(peer).await
    }

    async fn set_peer_sequence_id(&self, peer: &str, seq: i64) -> DatastoreResult<()> {
        let current = self.backend.get_peer_sequence_id_raw(peer).await?;
        if seq < current {
            debug!(peer, seq, current, "ignoring backward peer cursor move");
            return Ok(());
        }
        self.backend.set_peer_sequence_id_raw(peer, seq).await
    }

    async fn check(&self) -> DatastoreResult<bool> {
        check_docs(&self.backend.all_docs_raw(u32::MAX).await?, self.backend.sequence_id().await?)
    }

    async fn equals_no_seq(&self, other: &dyn Datastore, ceiling: u32) -> DatastoreResult<bool> {
        let mine = self.backend.all_docs_raw(ceiling).await?;
        equals_no_seq_impl(mine, other, ceiling).await
    }
}

/// Shared `check()` logic, factored out so both `Store<B>` and
/// `RemoteDatastore` (which has no `Backend`) can reuse it once they've
/// fetched their document sets.
pub(crate) fn check_docs(docs: &[Document], sequence_id: i64) -> DatastoreResult<bool> {
    let mut ok = true;
    let mut seen_ids = std::collections::HashSet::new();
    let mut seen_seqs = std::collections::HashSet::new();
    let mut max_seq = 0i64;

    for doc in docs {
        if !doc.contains_key(ID) || !doc.contains_key(REV) || !doc.contains_key(SEQ) {
            warn!("check: document missing a reserved field: {doc:?}");
            ok = false;
            continue;
        }
        let id = doc.id();
        if !seen_ids.insert(id.to_string()) {
            warn!(id, "check: duplicate _id");
            ok = false;
        }
        let seq = doc.seq().unwrap_or(0);
        if seq <= 0 || seq > sequence_id {
            warn!(id, seq, sequence_id, "check: _seq out of range");
            ok = false;
        }
        if !seen_seqs.insert(seq) {
            warn!(seq, "check: duplicate _seq");
            ok = false;
        }
        max_seq = max_seq.max(seq);
    }

    if max_seq != sequence_id && !(docs.is_empty() && sequence_id == 0) {
        warn!(max_seq, sequence_id, "check: max(_seq) != sequence_id");
        ok = false;
    }

    Ok(ok)
}

/// Shared `equals_no_seq` logic: sort both sides by the §3 total order
/// ignoring `_seq`, then compare pairwise.
pub(crate) async fn equals_no_seq_impl(
    mut mine: Vec<Document>,
    other: &dyn Datastore,
    ceiling: u32,
) -> DatastoreResult<bool> {
    let (_, other_docs) = other.get_docs_since(-1, ceiling).await?;
    let mut theirs = other_docs;

    mine.sort_by(|a, b| a.compare(Some(b), &[SEQ]).cmp(&0));
    theirs.sort_by(|a, b| a.compare(Some(b), &[SEQ]).cmp(&0));

    if mine.len() != theirs.len() {
        return Ok(false);
    }
    for (a, b) in mine.iter().zip(theirs.iter()) {
        if a.compare(Some(b), &[SEQ]) != 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::memory::MemoryBackend;
    use crate::document::DocValue;

    fn store(replica_id: &str) -> Store<MemoryBackend> {
        Store::new(MemoryBackend::new(replica_id, replica_id))
    }

    #[tokio::test]
    async fn authoring_put_assigns_own_clock_entry() {
        let ds = store("r1");
        let mut doc = Document::new("a");
        doc.set("v", DocValue::Int(1));
        let result = ds.put(doc, true).await.unwrap();
        assert_eq!(result.accepted, 1);
        assert_eq!(result.document.rev(), Some(r#"{"r1":1}"#));
        assert_eq!(result.document.seq(), Some(1));
    }

    #[tokio::test]
    async fn ignored_put_does_not_advance_sequence() {
        let ds = store("r1");
        let mut doc = Document::new("a");
        doc.set_rev(r#"{"r1":1}"#);
        doc.set_seq(1);
        ds.put(doc.clone(), false).await.unwrap();
        let before = ds.sequence_id().await.unwrap();
        let result = ds.put(doc, false).await.unwrap();
        assert_eq!(result.accepted, 0);
        assert_eq!(ds.sequence_id().await.unwrap(), before);
    }

    #[tokio::test]
    async fn delete_unknown_id_is_noop() {
        let ds = store("r1");
        ds.delete("nope").await.unwrap();
        assert_eq!(ds.sequence_id().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_tombstones_and_preserves_row() {
        let ds = store("r1");
        let doc = Document::new("a");
        ds.put(doc, true).await.unwrap();
        ds.delete("a").await.unwrap();
        assert!(ds.get("a", false).await.unwrap().is_none());
        let tomb = ds.get("a", true).await.unwrap().unwrap();
        assert!(tomb.deleted());
    }

    #[tokio::test]
    async fn peer_cursor_never_moves_backward() {
        let ds = store("r1");
        ds.set_peer_sequence_id("p", 5).await.unwrap();
        ds.set_peer_sequence_id("p", 2).await.unwrap();
        assert_eq!(ds.get_peer_sequence_id("p").await.unwrap(), 5);
        ds.set_peer_sequence_id("p", 9).await.unwrap();
        assert_eq!(ds.get_peer_sequence_id("p").await.unwrap(), 9);
    }
}
