//! Helpers shared by both relational dialect backends (spec.md §4.5): the
//! `data_sync_revisions` bootstrap values and upsert column-list building.
//! Split out so the acquire-phase contract ("both obey identical
//! semantics") isn't duplicated per dialect — the two dialects only differ
//! in placeholder syntax and upsert clause, which stay in `postgres.rs` /
//! `sqlite.rs`.

use crate::document::{DocValue, Document, DELETED, ID, REV, SEQ};
use crate::error::{DatastoreError, DatastoreResult};

pub const RESERVED_COLUMNS: [&str; 4] = [ID, REV, SEQ, DELETED];

/// Placeholder style for bound parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// SQLite/MySQL-style positional `?`.
    Question,
    /// Postgres-style numbered `$1, $2, ...`.
    Dollar,
}

impl Placeholder {
    pub fn list(&self, count: usize) -> String {
        match self {
            Placeholder::Question => vec!["?"; count].join(", "),
            Placeholder::Dollar => (1..=count).map(|i| format!("${i}")).collect::<Vec<_>>().join(", "),
        }
    }
}

/// The row of `data_sync_revisions` a freshly acquired datastore should use:
/// either adopted from an existing row, or a fresh one to insert.
#[derive(Debug, Clone)]
pub struct SyncRevisionRow {
    pub datastore_id: String,
    pub datastore_name: String,
    pub sequence_id: i64,
}

/// Validates that a data table's introspected column names carry the
/// reserved columns required for the algorithmic layer to function
/// (spec.md §4.5: "fail with MissingReservedColumn if any of `_id`, `_rev`,
/// `_deleted` is missing"). `_seq` is checked too since the whole sequence
/// model depends on it, even though spec.md's acquire-phase text only calls
/// out the other three explicitly.
pub fn validate_reserved_columns(columns: &[String]) -> DatastoreResult<()> {
    for reserved in [ID, REV, DELETED, SEQ] {
        if !columns.iter().any(|c| c == reserved) {
            return Err(DatastoreError::MissingReservedColumn(format!(
                "data table is missing reserved column {reserved}"
            )));
        }
    }
    Ok(())
}

/// User (non-reserved) columns, in the table's own column order — the
/// order an upsert's column list is built in.
pub fn user_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !RESERVED_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect()
}

/// The full ordered column list an upsert binds against: reserved columns
/// first (in a fixed order matching §6's persisted layout), then whatever
/// user columns the table happens to carry.
pub fn upsert_columns(table_columns: &[String]) -> Vec<String> {
    let mut out = vec![ID.to_string(), REV.to_string(), SEQ.to_string(), DELETED.to_string()];
    out.extend(user_columns(table_columns));
    out
}

/// Extracts `doc`'s values in the exact order `upsert_columns` returned,
/// defaulting absent user fields to `DocValue::Null` (a column present on
/// the table but unset on this particular document).
pub fn ordered_values(doc: &Document, columns: &[String]) -> Vec<DocValue> {
    columns
        .iter()
        .map(|c| doc.get(c).cloned().unwrap_or(DocValue::Null))
        .collect()
}

/// What `acquire` does with a looked-up `data_sync_revisions` row: adopt it,
/// or synthesize a fresh one at `sequence_id = 0` for `desired_id` (a
/// caller-configured id, or a freshly generated 32-hex replica id).
pub fn resolve_sync_revision(
    existing: Option<(String, i64)>,
    datastore_name: &str,
    desired_id: impl FnOnce() -> String,
) -> SyncRevisionRow {
    match existing {
        Some((datastore_id, sequence_id)) => SyncRevisionRow {
            datastore_id,
            datastore_name: datastore_name.to_string(),
            sequence_id,
        },
        None => SyncRevisionRow {
            datastore_id: desired_id(),
            datastore_name: datastore_name.to_string(),
            sequence_id: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_lists() {
        assert_eq!(Placeholder::Question.list(3), "?, ?, ?");
        assert_eq!(Placeholder::Dollar.list(3), "$1, $2, $3");
    }

    #[test]
    fn missing_reserved_column_is_detected() {
        let cols = vec!["_id".to_string(), "_rev".to_string(), "name".to_string()];
        assert!(validate_reserved_columns(&cols).is_err());
    }

    #[test]
    fn upsert_columns_puts_reserved_first() {
        let cols = vec![
            "name".to_string(),
            "_id".to_string(),
            "_deleted".to_string(),
            "_rev".to_string(),
            "_seq".to_string(),
        ];
        let out = upsert_columns(&cols);
        assert_eq!(out, vec!["_id", "_rev", "_seq", "_deleted", "name"]);
    }
}
