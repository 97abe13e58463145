//! Vector clock revisions: map from replica id to a monotonically
//! non-decreasing counter, with a deterministic tiebreak for concurrent
//! versions. See spec.md §3 and §4.1.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{DatastoreError, DatastoreResult};

/// A vector clock. `BTreeMap` keeps iteration in key order for free, which
/// is exactly the canonical form `to_string` needs to produce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the counter for `replica_id`, or 0 if absent.
    pub fn get(&self, replica_id: &str) -> u64 {
        self.clocks.get(replica_id).copied().unwrap_or(0)
    }

    /// Set the counter for `replica_id`. Fails if this would regress it.
    pub fn set(&mut self, replica_id: &str, value: u64) -> DatastoreResult<()> {
        let old = self.clocks.get(replica_id).copied();
        if let Some(old) = old {
            if value < old {
                return Err(DatastoreError::NonMonotonic(format!(
                    "clock for {replica_id} would regress from {old} to {value}"
                )));
            }
        }
        self.clocks.insert(replica_id.to_string(), value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Canonical JSON: sorted keys, no whitespace. `serde_json` over a
    /// `BTreeMap` already produces this, so there is nothing extra to do.
    pub fn to_canonical_string(&self) -> String {
        serde_json::to_string(&self.clocks).expect("map of string->u64 always serializes")
    }

    pub fn from_string(s: &str) -> DatastoreResult<Self> {
        let clocks: BTreeMap<String, u64> = serde_json::from_str(s)
            .map_err(|e| DatastoreError::MalformedClock(format!("{s:?}: {e}")))?;
        Ok(Self { clocks })
    }

    /// A stable hash of the canonical form, used only to tiebreak clocks
    /// that are otherwise concurrent with the same maximum component.
    fn stable_hash(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.to_canonical_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Compare two clocks per spec.md §3: componentwise order when one side
    /// dominates, otherwise a deterministic tiebreak (larger max component
    /// wins; ties broken by hash of the canonical form). Never returns an
    /// "undefined"/concurrent state — the tiebreak always resolves to a
    /// total order, matching the Python reference (`VectorClock._compare`).
    ///
    /// Panics if two unequal clocks hash equal — spec.md documents this as
    /// an impossible case that must be treated as a fatal implementation
    /// bug rather than silently papered over.
    pub fn compare(&self, other: &VectorClock) -> Ordering {
        let keys: std::collections::BTreeSet<&String> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        if keys.is_empty() {
            return Ordering::Equal;
        }

        let mut all_less = true;
        let mut all_greater = true;
        let mut all_equal = true;
        for key in &keys {
            let a = self.get(key);
            let b = other.get(key);
            match a.cmp(&b) {
                Ordering::Less => {
                    all_greater = false;
                    all_equal = false;
                }
                Ordering::Greater => {
                    all_less = false;
                    all_equal = false;
                }
                Ordering::Equal => {
                    all_less = false;
                    all_greater = false;
                }
            }
        }

        if all_equal {
            return Ordering::Equal;
        }
        if all_less {
            return Ordering::Less;
        }
        if all_greater {
            return Ordering::Greater;
        }

        // Concurrent: tiebreak by largest max component, then by hash.
        let max_self = self.clocks.values().copied().max().unwrap_or(0);
        let max_other = other.clocks.values().copied().max().unwrap_or(0);
        if max_self != max_other {
            return max_self.cmp(&max_other);
        }

        let h1 = self.stable_hash();
        let h2 = other.stable_hash();
        match h1.cmp(&h2) {
            Ordering::Equal => panic!(
                "vector clock hash collision between unequal clocks {self:?} and {other:?}"
            ),
            ord => ord,
        }
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for VectorClock {}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for VectorClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}
