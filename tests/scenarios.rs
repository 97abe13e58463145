//! End-to-end scenarios S1-S6 and the boundary behaviors from spec.md §8,
//! exercised against the in-memory backend.

use reldatasync::datastore::memory::MemoryBackend;
use reldatasync::datastore::Store;
use reldatasync::{DocValue, Document, Datastore, Replicator};

fn replica(id: &str) -> Store<MemoryBackend> {
    Store::new(MemoryBackend::new(id, id))
}

#[tokio::test]
async fn s1_non_overlapping_writes_converge() {
    let a = replica("A");
    let b = replica("B");

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

    assert_eq!(a.get("A", false).await.unwrap().unwrap().rev(), Some(r#"{"A":1}"#));
    assert_eq!(a.get("B", false).await.unwrap().unwrap().rev(), Some(r#"{"B":1}"#));
    assert!(a.equals_no_seq(&b, 100).await.unwrap());
}

#[tokio::test]
async fn s2_concurrent_write_same_id_converges_regardless_of_sync_direction() {
    let run = |initiator_is_a: bool| async move {
        let a = replica("A");
        let b = replica("B");

        let mut doc_a = Document::new("C");
        doc_a.set("value", DocValue::Text("v3".to_string()));
        a.put(doc_a, true).await.unwrap();

        let mut doc_b = Document::new("C");
        doc_b.set("value", DocValue::Text("v4".to_string()));
        b.put(doc_b, true).await.unwrap();

        if initiator_is_a {
            Replicator::sync_both_directions(&a, &b, 10).await.unwrap();
        } else {
            Replicator::sync_both_directions(&b, &a, 10).await.unwrap();
        }

        let winner_a = a.get("C", false).await.unwrap().unwrap();
        let winner_b = b.get("C", false).await.unwrap().unwrap();
        winner_a.compare(Some(&winner_b), &["_seq"]) == 0
    };

    assert!(run(true).await);
    assert!(run(false).await);
}

#[tokio::test]
async fn s3_tombstone_propagates_and_is_hidden_by_default() {
    let a = replica("A");
    let b = replica("B");

    a.put(Document::new("A"), true).await.unwrap();
    Replicator::sync_both_directions(&a, &b, 10).await.unwrap();
    let pre_delete_rev = a.get("A", false).await.unwrap().unwrap().rev().unwrap().to_string();

    a.delete("A").await.unwrap();
    Replicator::sync_both_directions(&a, &b, 10).await.unwrap();

    assert!(b.get("A", false).await.unwrap().is_none());
    let tomb = b.get("A", true).await.unwrap().unwrap();
    assert!(tomb.deleted());

    use reldatasync::VectorClock;
    let pre = VectorClock::from_string(&pre_delete_rev).unwrap();
    let post = VectorClock::from_string(tomb.rev().unwrap()).unwrap();
    assert!(post >= pre);
}

#[tokio::test]
async fn s4_transitive_convergence_across_three_replicas() {
    let a = replica("A");
    let b = replica("B");
    let c = replica("C");

    a.put(Document::new("a-only"), true).await.unwrap();
    b.put(Document::new("b-only"), true).await.unwrap();
    c.put(Document::new("c-only"), true).await.unwrap();

    let mut da = Document::new("D");
    da.set("v", DocValue::Text("from-a".to_string()));
    a.put(da, true).await.unwrap();
    let mut db = Document::new("D");
    db.set("v", DocValue::Text("from-b".to_string()));
    b.put(db, true).await.unwrap();
    let mut dc = Document::new("D");
    dc.set("v", DocValue::Text("from-c".to_string()));
    c.put(dc, true).await.unwrap();

    Replicator::sync_both_directions(&a, &b, 10).await.unwrap();
    Replicator::sync_both_directions(&b, &c, 10).await.unwrap();
    Replicator::sync_both_directions(&a, &b, 10).await.unwrap();

    assert!(a.equals_no_seq(&b, 100).await.unwrap());
    assert!(b.equals_no_seq(&c, 100).await.unwrap());
    assert!(a.equals_no_seq(&c, 100).await.unwrap());
}

#[tokio::test]
async fn s5_chunking_requires_repeated_pulls_and_reconciliation_moves_nothing() {
    let a = replica("A");
    let b = replica("B");
    for i in 0..7 {
        a.put(Document::new(format!("doc{i}")), true).await.unwrap();
    }

    let first = Replicator::pull(&b, &a, 2).await.unwrap();
    assert_eq!(first, 7);

    Replicator::sync_both_directions(&a, &b, 2).await.unwrap();
    let reconciliation = Replicator::pull(&a, &b, 2).await.unwrap();
    assert_eq!(reconciliation, 0);
}

#[tokio::test]
async fn s6_ignored_put_leaves_sequence_unchanged() {
    let a = replica("A");
    let put = a.put(Document::new("a"), true).await.unwrap();
    let before = a.sequence_id().await.unwrap();

    let result = a.put(put.document.clone(), false).await.unwrap();
    assert_eq!(result.accepted, 0);
    assert_eq!(a.sequence_id().await.unwrap(), before);
}

#[tokio::test]
async fn boundary_empty_replica_returns_zero_and_empty() {
    let a = replica("A");
    let (seq, docs) = a.get_docs_since(0, 10).await.unwrap();
    assert_eq!(seq, 0);
    assert!(docs.is_empty());
}

#[tokio::test]
async fn boundary_delete_unknown_id_is_noop() {
    let a = replica("A");
    a.delete("nope").await.unwrap();
    assert_eq!(a.sequence_id().await.unwrap(), 0);

    a.put(Document::new("x"), true).await.unwrap();
    a.delete("x").await.unwrap();
    let before = a.sequence_id().await.unwrap();
    a.delete("x").await.unwrap();
    assert_eq!(a.sequence_id().await.unwrap(), before);
}
