//! The pairwise sync protocol (spec.md §4.6), ported from
//! `replicator.py`'s `pull`/`sync_both_directions`.

use tracing::{debug, info};

use crate::datastore::Datastore;
use crate::error::DatastoreResult;

pub struct Replicator;

impl Replicator {
    /// Chunked pull: copies everything `source` has produced since
    /// `destination`'s last-known cursor for `source`, `k` documents at a
    /// time, then persists the advanced cursor.
    pub async fn pull(
        destination: &dyn Datastore,
        source: &dyn Datastore,
        k: u32,
    ) -> DatastoreResult<u32> {
        let mut cur = destination.get_peer_sequence_id(source.replica_id()).await?;
        let mut src_seq: Option<i64> = None;
        let mut changed = 0u32;

        loop {
            if let Some(s) = src_seq {
                if s <= cur {
                    break;
                }
            }

            let (seq, batch) = source.get_docs_since(cur, k).await?;
            src_seq = Some(seq);

            for doc in batch {
                let result = destination.put(doc, false).await?;
                changed += result.accepted;
            }

            cur = std::cmp::min(seq, cur + k as i64);
            debug!(
                source = source.replica_id(),
                destination = destination.replica_id(),
                cur,
                src_seq = seq,
                "pull advanced cursor"
            );
        }

        destination.set_peer_sequence_id(source.replica_id(), cur).await?;
        Ok(changed)
    }

    /// Bidirectional sync: pull(dest <- source), pull(source <- dest), then
    /// a reconciliation pull(dest <- source) that the spec requires move no
    /// data (`changed == 0`) — its only job is to leave `dest`'s cursor on
    /// `source` equal to `source.sequence_id`.
    ///
    /// The historical third assertion comparing `destination.sequence_id ==
    /// source.sequence_id` is intentionally not implemented — it does not
    /// hold once ignored puts stop advancing `_seq`, and the current Python
    /// source has already dropped it, keeping only the peer-cursor checks
    /// below.
    pub async fn sync_both_directions(a: &dyn Datastore, b: &dyn Datastore, k: u32) -> DatastoreResult<()> {
        Self::pull(a, b, k).await?;
        Self::pull(b, a, k).await?;
        let final_changes = Self::pull(a, b, k).await?;
        assert_eq!(final_changes, 0, "reconciliation pull must not move data");

        let a_seq = a.sequence_id().await?;
        let b_seq = b.sequence_id().await?;
        let a_peer_of_b = a.get_peer_sequence_id(b.replica_id()).await?;
        let b_peer_of_a = b.get_peer_sequence_id(a.replica_id()).await?;
        assert_eq!(a_peer_of_b, b_seq, "a's cursor on b must equal b's sequence_id");
        assert_eq!(b_peer_of_a, a_seq, "b's cursor on a must equal a's sequence_id");

        info!(
            a = a.replica_id(),
            b = b.replica_id(),
            a_seq,
            b_seq,
            "sync_both_directions converged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::memory::MemoryBackend;
    use crate::datastore::Store;
    use crate::document::{DocValue, Document};

    #[tokio::test]
    async fn non_overlapping_puts_converge() {
        let a = Store::new(MemoryBackend::new("ra", "ra"));
        let b = Store::new(MemoryBackend::new("rb", "rb"));

        let mut doc_a = Document::new("A");
        doc_a.set("value", DocValue::Text("v1".to_string()));
        a.put(doc_a, true).await.unwrap();

        let mut doc_b = Document::new("B");
        doc_b.set("value", DocValue::Text("v2".to_string()));
        b.put(doc_b, true).await.unwrap();

        Replicator::sync_both_directions(&a, &b, 10).await.unwrap();

        assert!(a.get("A", false).await.unwrap().is_some());
        assert!(a.get("B", false).await.unwrap().is_some());
        assert!(b.get("A", false).await.unwrap().is_some());
        assert!(b.get("B", false).await.unwrap().is_some());
        assert!(a.equals_no_seq(&b, 100).await.unwrap());
    }

    #[tokio::test]
    async fn chunked_pull_requires_multiple_batches() {
        let a = Store::new(MemoryBackend::new("ra", "ra"));
        let b = Store::new(MemoryBackend::new("rb", "rb"));

        for i in 0..5 {
            a.put(Document::new(format!("doc{i}")), true).await.unwrap();
        }

        let changed = Replicator::pull(&b, &a, 2).await.unwrap();
        assert_eq!(changed, 5);
        assert_eq!(b.get_peer_sequence_id("ra").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn reconciliation_pull_moves_nothing() {
        let a = Store::new(MemoryBackend::new("ra", "ra"));
        let b = Store::new(MemoryBackend::new("rb", "rb"));
        a.put(Document::new("x"), true).await.unwrap();
        Replicator::sync_both_directions(&a, &b, 2).await.unwrap();
        let changed = Replicator::pull(&a, &b, 2).await.unwrap();
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn tombstone_propagates_and_is_hidden_by_default() {
        let a = Store::new(MemoryBackend::new("ra", "ra"));
        let b = Store::new(MemoryBackend::new("rb", "rb"));
        a.put(Document::new("a"), true).await.unwrap();
        Replicator::sync_both_directions(&a, &b, 10).await.unwrap();
        a.delete("a").await.unwrap();
        Replicator::sync_both_directions(&a, &b, 10).await.unwrap();

        assert!(b.get("a", false).await.unwrap().is_none());
        let tomb = b.get("a", true).await.unwrap().unwrap();
        assert!(tomb.deleted());
    }
}
