//! Content-addressable document record: reserved fields `_id`, `_rev`,
//! `_seq`, `_deleted`, plus arbitrary user fields. See spec.md §3 and §4.2.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatastoreError, DatastoreResult};

pub const ID: &str = "_id";
pub const REV: &str = "_rev";
pub const SEQ: &str = "_seq";
pub const DELETED: &str = "_deleted";

/// A schema field type, ported from `reldatasync.schema.Schema` — the
/// sqlite3 type affinities plus boolean/date/datetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Boolean,
    Date,
    DateTime,
}

/// A map of user field name to its intended type, used only to revive
/// typed values on deserialization (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    field_types: BTreeMap<String, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, ty: FieldType) -> Self {
        self.field_types.insert(field.into(), ty);
        self
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.field_types.get(field).copied()
    }
}

/// A scalar value a document field may hold. Typed rather than a bag of
/// `serde_json::Value` because the relational backends need to bind
/// concrete SQL types, not re-sniff JSON on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl DocValue {
    /// Rank used to totally order values of different variants. Only
    /// reached when comparing documents whose shapes differ, or whose
    /// schemas disagree — within one schema, values for the same field are
    /// always the same variant.
    fn type_rank(&self) -> u8 {
        match self {
            DocValue::Null => 0,
            DocValue::Bool(_) => 1,
            DocValue::Int(_) => 2,
            DocValue::Float(_) => 3,
            DocValue::Text(_) => 4,
            DocValue::Date(_) => 5,
            DocValue::DateTime(_) => 6,
        }
    }
}

impl PartialEq for DocValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DocValue {}

impl PartialOrd for DocValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocValue {
    fn cmp(&self, other: &Self) -> Ordering {
        // _compare_vals: None sorts before any non-None value.
        match (self, other) {
            (DocValue::Null, DocValue::Null) => Ordering::Equal,
            (DocValue::Null, _) => Ordering::Less,
            (_, DocValue::Null) => Ordering::Greater,
            (DocValue::Bool(a), DocValue::Bool(b)) => a.cmp(b),
            (DocValue::Int(a), DocValue::Int(b)) => a.cmp(b),
            (DocValue::Float(a), DocValue::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (DocValue::Text(a), DocValue::Text(b)) => a.cmp(b),
            (DocValue::Date(a), DocValue::Date(b)) => a.cmp(b),
            (DocValue::DateTime(a), DocValue::DateTime(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

/// A document: a keyed collection with a mandatory `_id`, reserved
/// `_rev`/`_seq`/`_deleted`, and arbitrary user fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    fields: BTreeMap<String, DocValue>,
}

impl Document {
    /// Builds a document from a field map, failing if `_id` is absent.
    pub fn from_fields(fields: BTreeMap<String, DocValue>) -> DatastoreResult<Self> {
        if !fields.contains_key(ID) {
            return Err(DatastoreError::InvalidDocument(
                "document is missing required field _id".to_string(),
            ));
        }
        Ok(Self { fields })
    }

    /// Convenience constructor for a bare id with no other fields yet.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(ID.to_string(), DocValue::Text(id.into()));
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: DocValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<DocValue> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocValue)> {
        self.fields.iter()
    }

    pub fn id(&self) -> &str {
        match self.fields.get(ID) {
            Some(DocValue::Text(s)) => s.as_str(),
            _ => panic!("document invariant violated: _id missing or not text"),
        }
    }

    pub fn rev(&self) -> Option<&str> {
        match self.fields.get(REV) {
            Some(DocValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.set(REV, DocValue::Text(rev.into()));
    }

    pub fn seq(&self) -> Option<i64> {
        match self.fields.get(SEQ) {
            Some(DocValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn set_seq(&mut self, seq: i64) {
        self.set(SEQ, DocValue::Int(seq));
    }

    pub fn deleted(&self) -> bool {
        matches!(self.fields.get(DELETED), Some(DocValue::Bool(true)))
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.set(DELETED, DocValue::Bool(deleted));
    }

    /// Deep copy. `Document` already derives `Clone` over an owned
    /// `BTreeMap`, so mutating the clone never touches the original — this
    /// method exists to name the operation the spec calls out explicitly.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Total order per spec.md §3: fewer keys < more keys; then
    /// lexicographic by sorted key names; then lexicographic by the values
    /// at those keys; `None` sorts before any non-`None` value.
    ///
    /// `other = None` compares as "greater than anything" per the Python
    /// reference (`compare` treats a missing comparison partner the same
    /// as having strictly fewer keys).
    pub fn compare(&self, other: Option<&Document>, ignore_keys: &[&str]) -> i32 {
        let keys: Vec<&String> = self
            .fields
            .keys()
            .filter(|k| !ignore_keys.contains(&k.as_str()))
            .collect();

        let other = match other {
            None => return 1,
            Some(o) => o,
        };

        let other_keys: Vec<&String> = other
            .fields
            .keys()
            .filter(|k| !ignore_keys.contains(&k.as_str()))
            .collect();

        match keys.len().cmp(&other_keys.len()) {
            Ordering::Greater => return 1,
            Ordering::Less => return -1,
            Ordering::Equal => {}
        }

        for (a, b) in keys.iter().zip(other_keys.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                Ordering::Less => return -1,
                Ordering::Greater => return 1,
            }
        }

        for key in &keys {
            let a = self.fields.get(key.as_str()).unwrap_or(&DocValue::Null);
            let b = other.fields.get(key.as_str()).unwrap_or(&DocValue::Null);
            match a.cmp(b) {
                Ordering::Equal => {}
                Ordering::Less => return -1,
                Ordering::Greater => return 1,
            }
        }

        0
    }
}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.compare(Some(other), &[]) {
            n if n < 0 => Ordering::Less,
            0 => Ordering::Equal,
            _ => Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_id_is_rejected() {
        let mut fields = BTreeMap::new();
        fields.insert("foo".to_string(), DocValue::Int(1));
        assert!(Document::from_fields(fields).is_err());
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut doc = Document::new("a");
        let mut copy = doc.deep_copy();
        copy.set("x", DocValue::Int(1));
        assert!(doc.get("x").is_none());
        doc.set("y", DocValue::Int(2));
        assert!(copy.get("y").is_none());
    }

    #[test]
    fn fewer_keys_sorts_first() {
        let small = Document::new("a");
        let mut big = Document::new("a");
        big.set("extra", DocValue::Int(1));
        assert_eq!(small.compare(Some(&big), &[]), -1);
        assert_eq!(big.compare(Some(&small), &[]), 1);
    }

    #[test]
    fn none_value_sorts_before_non_none() {
        let mut a = Document::new("a");
        a.set("v", DocValue::Null);
        let mut b = Document::new("a");
        b.set("v", DocValue::Int(0));
        assert_eq!(a.compare(Some(&b), &[]), -1);
    }

    #[test]
    fn ignore_keys_excludes_seq_from_comparison() {
        let mut a = Document::new("a");
        a.set_seq(1);
        let mut b = Document::new("a");
        b.set_seq(2);
        assert_eq!(a.compare(Some(&b), &[SEQ]), 0);
        assert_ne!(a.compare(Some(&b), &[]), 0);
    }

    #[test]
    fn compare_against_none_is_always_greater() {
        let a = Document::new("a");
        assert_eq!(a.compare(None, &[]), 1);
    }
}
