//! The randomized convergence property from spec.md §8: random puts/deletes
//! across a small id space interleaved with random pairwise syncs must
//! converge to pairwise `equals_no_seq` and a passing `check()` on every
//! replica once writes stop and one final round-robin sync completes.

use proptest::prelude::*;
use reldatasync::datastore::memory::MemoryBackend;
use reldatasync::datastore::Store;
use reldatasync::{DocValue, Datastore, Document, Replicator};

const NUM_REPLICAS: usize = 3;
const ID_SPACE: usize = 5;

#[derive(Debug, Clone)]
enum Op {
    Put { replica: usize, id: usize, value: i64 },
    Delete { replica: usize, id: usize },
    Sync { a: usize, b: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NUM_REPLICAS, 0..ID_SPACE, any::<i64>())
            .prop_map(|(replica, id, value)| Op::Put { replica, id, value }),
        (0..NUM_REPLICAS, 0..ID_SPACE).prop_map(|(replica, id)| Op::Delete { replica, id }),
        (0..NUM_REPLICAS, 0..NUM_REPLICAS)
            .prop_filter("sync requires distinct replicas", |(a, b)| a != b)
            .prop_map(|(a, b)| Op::Sync { a, b }),
    ]
}

async fn apply(replicas: &[Store<MemoryBackend>], op: &Op) {
    match op {
        Op::Put { replica, id, value } => {
            let mut doc = Document::new(format!("id{id}"));
            doc.set("value", DocValue::Int(*value));
            replicas[*replica].put(doc, true).await.unwrap();
        }
        Op::Delete { replica, id } => {
            replicas[*replica].delete(&format!("id{id}")).await.unwrap();
        }
        Op::Sync { a, b } => {
            Replicator::sync_both_directions(&replicas[*a], &replicas[*b], 3).await.unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn random_workload_converges(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let replicas: Vec<Store<MemoryBackend>> = (0..NUM_REPLICAS)
                .map(|i| Store::new(MemoryBackend::new(format!("r{i}"), format!("r{i}"))))
                .collect();

            for op in &ops {
                apply(&replicas, op).await;
            }

            // One final full round-robin with no more writes.
            for i in 0..NUM_REPLICAS {
                for j in (i + 1)..NUM_REPLICAS {
                    Replicator::sync_both_directions(&replicas[i], &replicas[j], 3).await.unwrap();
                }
            }

            for i in 0..NUM_REPLICAS {
                for j in (i + 1)..NUM_REPLICAS {
                    let equal = replicas[i].equals_no_seq(&replicas[j], 1000).await.unwrap();
                    prop_assert!(equal, "replicas {i} and {j} did not converge");
                }
            }
            for r in &replicas {
                prop_assert!(r.check().await.unwrap(), "check() failed after convergence");
            }
            Ok(())
        })?;
    }
}
