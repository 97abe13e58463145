//! SQLite relational backend (spec.md §4.5), grounded in the teacher's
//! `SqliteDatabase`: a `SqlitePool`, `?` placeholders, and
//! `INSERT OR REPLACE` upserts as in
//! `SqliteDatabase::update_association_count`'s pattern. Shares the
//! column-list and bootstrap logic in `datastore::sql` with the Postgres
//! backend; see that module and `postgres.rs` for why user columns are
//! stored as JSON-encoded `TEXT`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::datastore::sql::{resolve_sync_revision, upsert_columns, validate_reserved_columns};
use crate::datastore::Backend;
use crate::document::{DocValue, Document, Schema, DELETED, ID, REV, SEQ};
use crate::error::{DatastoreError, DatastoreResult};
use crate::json_codec::{decode_scalar, encode_scalar};

pub struct SqliteBackend {
    pool: SqlitePool,
    table: String,
    replica_id: String,
    replica_name: String,
    schema: Option<Schema>,
    columns: Vec<String>,
}

impl SqliteBackend {
    pub async fn acquire(
        pool: SqlitePool,
        table: impl Into<String>,
        datastore_name: impl Into<String>,
        configured_id: Option<String>,
        schema: Option<Schema>,
    ) -> DatastoreResult<Self> {
        let table = table.into();
        let datastore_name = datastore_name.into();

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS data_sync_revisions ( \
                datastore_id TEXT PRIMARY KEY, \
                datastore_name TEXT UNIQUE NOT NULL, \
                sequence_id INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await?;

        let existing = sqlx::query(
            "SELECT datastore_id, sequence_id FROM data_sync_revisions WHERE datastore_name = ?",
        )
        .bind(&datastore_name)
        .fetch_optional(&pool)
        .await?
        .map(|row| (row.get::<String, _>("datastore_id"), row.get::<i64, _>("sequence_id")));

        let revision = resolve_sync_revision(existing, &datastore_name, || {
            configured_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
        });

        sqlx::query(
            "INSERT OR IGNORE INTO data_sync_revisions (datastore_id, datastore_name, sequence_id) \
             VALUES (?, ?, ?)",
        )
        .bind(&revision.datastore_id)
        .bind(&revision.datastore_name)
        .bind(revision.sequence_id)
        .execute(&pool)
        .await?;

        let column_rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&pool)
            .await?;
        if column_rows.is_empty() {
            return Err(DatastoreError::MissingTable(format!("table {table} does not exist")));
        }
        let columns: Vec<String> = column_rows.iter().map(|r| r.get::<String, _>("name")).collect();
        validate_reserved_columns(&columns)?;

        Ok(Self {
            pool,
            table,
            replica_id: revision.datastore_id,
            replica_name: revision.datastore_name,
            schema,
            columns,
        })
    }

    fn row_to_document(&self, row: &sqlx::sqlite::SqliteRow) -> DatastoreResult<Document> {
        let mut doc = Document::new(row.get::<String, _>(ID));
        doc.set_rev(row.get::<String, _>(REV));
        doc.set_seq(row.get::<i64, _>(SEQ));
        doc.set_deleted(row.get::<Option<bool>, _>(DELETED).unwrap_or(false));
        for col in &self.columns {
            if [ID, REV, SEQ, DELETED].contains(&col.as_str()) {
                continue;
            }
            if let Some(text) = row.get::<Option<String>, _>(col.as_str()) {
                doc.set(col.clone(), decode_scalar(col, &text, self.schema.as_ref())?);
            }
        }
        Ok(doc)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn replica_id(&self) -> &str {
        &self.replica_id
    }

    fn replica_name(&self) -> &str {
        &self.replica_name
    }

    async fn sequence_id(&self) -> DatastoreResult<i64> {
        let row = sqlx::query("SELECT sequence_id FROM data_sync_revisions WHERE datastore_id = ?")
            .bind(&self.replica_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("sequence_id"))
    }

    async fn bump_sequence_id(&self) -> DatastoreResult<i64> {
        sqlx::query("UPDATE data_sync_revisions SET sequence_id = sequence_id + 1 WHERE datastore_id = ?")
            .bind(&self.replica_id)
            .execute(&self.pool)
            .await?;
        self.sequence_id().await
    }

    async fn get_raw(&self, id: &str) -> DatastoreResult<Option<Document>> {
        let row = sqlx::query(&format!("SELECT * FROM {} WHERE _id = ?", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.row_to_document(&r)).transpose()
    }

    async fn put_raw(&self, doc: Document) -> DatastoreResult<()> {
        let cols = upsert_columns(&self.columns);
        let col_list = cols.join(", ");
        let placeholders = vec!["?"; cols.len()].join(", ");
        let sql = format!("INSERT OR REPLACE INTO {} ({col_list}) VALUES ({placeholders})", self.table);

        let mut query = sqlx::query(&sql);
        for col in &cols {
            query = match col.as_str() {
                ID | REV => query.bind(match doc.get(col) {
                    Some(DocValue::Text(s)) => s.clone(),
                    _ => String::new(),
                }),
                SEQ => query.bind(doc.seq().unwrap_or(0)),
                DELETED => query.bind(doc.deleted()),
                _ => query.bind(doc.get(col).map(encode_scalar)),
            };
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn get_docs_since_raw(&self, cursor: i64, n: u32) -> DatastoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} WHERE ? < _seq AND _seq <= ? ORDER BY _seq",
            self.table
        ))
        .bind(cursor)
        .bind(cursor + n as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| self.row_to_document(r)).collect()
    }

    async fn all_docs_raw(&self, ceiling: u32) -> DatastoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!("SELECT * FROM {} ORDER BY _seq LIMIT ?", self.table))
            .bind(ceiling as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| self.row_to_document(r)).collect()
    }

    async fn get_peer_sequence_id_raw(&self, peer: &str) -> DatastoreResult<i64> {
        let row = sqlx::query(
            "SELECT sequence_id FROM data_sync_peer_cursors WHERE datastore_id = ? AND peer_id = ?",
        )
        .bind(&self.replica_id)
        .bind(peer)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("sequence_id")).unwrap_or(0))
    }

    async fn set_peer_sequence_id_raw(&self, peer: &str, seq: i64) -> DatastoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS data_sync_peer_cursors ( \
                datastore_id TEXT NOT NULL, peer_id TEXT NOT NULL, sequence_id INTEGER NOT NULL, \
                PRIMARY KEY (datastore_id, peer_id))",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO data_sync_peer_cursors (datastore_id, peer_id, sequence_id) \
             VALUES (?, ?, ?)",
        )
        .bind(&self.replica_id)
        .bind(peer)
        .bind(seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
