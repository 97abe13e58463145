//! Postgres relational backend (spec.md §4.5), grounded in the teacher's
//! `PostgresDatabase`: a `PgPool`, `$N` placeholders, and
//! `ON CONFLICT (_id) DO UPDATE` upserts generalized from
//! `PostgresDatabase::create_association`'s `ON CONFLICT DO NOTHING`.
//!
//! User columns are stored as `TEXT` holding a JSON-encoded scalar rather
//! than native per-type SQL columns — the dataset's schema is supplied by
//! the caller at the `Document`/`Schema` layer, not fixed at table-creation
//! time, so a single portable column type avoids a `CREATE`/`ALTER TABLE`
//! dance per user field. See DESIGN.md for the open-question resolution.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::datastore::sql::{resolve_sync_revision, upsert_columns, validate_reserved_columns};
use crate::datastore::Backend;
use crate::document::{DocValue, Document, Schema, DELETED, ID, REV, SEQ};
use crate::error::{DatastoreError, DatastoreResult};
use crate::json_codec::{decode_scalar, encode_scalar};

pub struct PostgresBackend {
    pool: PgPool,
    table: String,
    replica_id: String,
    replica_name: String,
    schema: Option<Schema>,
    columns: Vec<String>,
}

impl PostgresBackend {
    /// Binding phase (spec.md §4.5 "acquire"): bootstraps
    /// `data_sync_revisions`, adopts or creates this replica's row, and
    /// introspects `table`'s columns.
    pub async fn acquire(
        pool: PgPool,
        table: impl Into<String>,
        datastore_name: impl Into<String>,
        configured_id: Option<String>,
        schema: Option<Schema>,
    ) -> DatastoreResult<Self> {
        let table = table.into();
        let datastore_name = datastore_name.into();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data_sync_revisions (
                datastore_id TEXT PRIMARY KEY,
                datastore_name TEXT UNIQUE NOT NULL,
                sequence_id BIGINT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let existing = sqlx::query(
            "SELECT datastore_id, sequence_id FROM data_sync_revisions WHERE datastore_name = $1",
        )
        .bind(&datastore_name)
        .fetch_optional(&pool)
        .await?
        .map(|row| (row.get::<String, _>("datastore_id"), row.get::<i64, _>("sequence_id")));

        let revision = resolve_sync_revision(existing, &datastore_name, || {
            configured_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
        });

        sqlx::query(
            "INSERT INTO data_sync_revisions (datastore_id, datastore_name, sequence_id) \
             VALUES ($1, $2, $3) ON CONFLICT (datastore_id) DO NOTHING",
        )
        .bind(&revision.datastore_id)
        .bind(&revision.datastore_name)
        .bind(revision.sequence_id)
        .execute(&pool)
        .await?;

        let column_rows = sqlx::query(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
        )
        .bind(&table)
        .fetch_all(&pool)
        .await?;

        if column_rows.is_empty() {
            return Err(DatastoreError::MissingTable(format!("table {table} does not exist")));
        }
        let columns: Vec<String> = column_rows.iter().map(|r| r.get("column_name")).collect();
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

    fn row_to_document(&self, row: &sqlx::postgres::PgRow) -> DatastoreResult<Document> {
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
impl Backend for PostgresBackend {
    fn replica_id(&self) -> &str {
        &self.replica_id
    }

    fn replica_name(&self) -> &str {
        &self.replica_name
    }

    async fn sequence_id(&self) -> DatastoreResult<i64> {
        let row = sqlx::query("SELECT sequence_id FROM data_sync_revisions WHERE datastore_id = $1")
            .bind(&self.replica_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("sequence_id"))
    }

    async fn bump_sequence_id(&self) -> DatastoreResult<i64> {
        let row = sqlx::query(
            "UPDATE data_sync_revisions SET sequence_id = sequence_id + 1 \
             WHERE datastore_id = $1 RETURNING sequence_id",
        )
        .bind(&self.replica_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("sequence_id"))
    }

    async fn get_raw(&self, id: &str) -> DatastoreResult<Option<Document>> {
        let row = sqlx::query(&format!("SELECT * FROM {} WHERE _id = $1", self.table))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| self.row_to_document(&r)).transpose()
    }

    async fn put_raw(&self, doc: Document) -> DatastoreResult<()> {
        let cols = upsert_columns(&self.columns);
        let col_list = cols.join(", ");
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("${i}")).collect();
        let updates: Vec<String> = cols
            .iter()
            .filter(|c| c.as_str() != ID)
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({col_list}) VALUES ({}) ON CONFLICT (_id) DO UPDATE SET {}",
            self.table,
            placeholders.join(", "),
            updates.join(", "),
        );

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
            "SELECT * FROM {} WHERE $1 < _seq AND _seq <= $2 ORDER BY _seq",
            self.table
        ))
        .bind(cursor)
        .bind(cursor + n as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| self.row_to_document(r)).collect()
    }

    async fn all_docs_raw(&self, ceiling: u32) -> DatastoreResult<Vec<Document>> {
        let rows = sqlx::query(&format!("SELECT * FROM {} ORDER BY _seq LIMIT $1", self.table))
            .bind(ceiling as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| self.row_to_document(r)).collect()
    }

    async fn get_peer_sequence_id_raw(&self, peer: &str) -> DatastoreResult<i64> {
        let row = sqlx::query(
            "SELECT sequence_id FROM data_sync_peer_cursors WHERE datastore_id = $1 AND peer_id = $2",
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
                datastore_id TEXT NOT NULL, peer_id TEXT NOT NULL, sequence_id BIGINT NOT NULL, \
                PRIMARY KEY (datastore_id, peer_id))",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "INSERT INTO data_sync_peer_cursors (datastore_id, peer_id, sequence_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (datastore_id, peer_id) DO UPDATE SET sequence_id = EXCLUDED.sequence_id",
        )
        .bind(&self.replica_id)
        .bind(peer)
        .bind(seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
