//! SQLite-backed vector index and fingerprint ledger.
//!
//! One database file holds two tables:
//! - `chunks`: one row per embedding record (chunk text, metadata, vector blob)
//! - `ledger`: `(doc_id, fingerprint)` pairs recorded by the ingestion pipeline
//!
//! Query filters are translated into a parameterized `WHERE` clause, so only
//! admitted rows are loaded and scored.

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use docsage_core::document::{Chunk, DocumentMetadata};
use docsage_core::error::IndexError;
use docsage_core::filter::{Field, FilterValue, Predicate, QueryFilter};
use docsage_core::index::{DocumentStore, EmbeddingRecord, SearchHit, VectorIndex};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::vector;

/// A SQLite index implementing both [`VectorIndex`] and [`DocumentStore`].
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &str) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| IndexError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let index = Self::from_pool(pool).await?;
        info!("SQLite index initialized at {path}");
        Ok(index)
    }

    /// An ephemeral database on a single connection.
    pub async fn in_memory() -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Unavailable(format!("Failed to open SQLite: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, IndexError> {
        let index = Self { pool };
        index.run_migrations().await?;
        Ok(index)
    }

    async fn run_migrations(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                fingerprint  TEXT PRIMARY KEY NOT NULL,
                doc_id       TEXT NOT NULL,
                position     INTEGER NOT NULL,
                byte_offset  INTEGER NOT NULL,
                text         TEXT NOT NULL,
                private      INTEGER NOT NULL DEFAULT 0,
                metadata     TEXT NOT NULL DEFAULT '{}',
                embedding    BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("chunks table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::MigrationFailed(format!("doc_id index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_private ON chunks(private)")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::MigrationFailed(format!("private index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                doc_id       TEXT NOT NULL,
                fingerprint  TEXT NOT NULL,
                PRIMARY KEY (doc_id, fingerprint)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::MigrationFailed(format!("ledger table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<EmbeddingRecord, IndexError> {
        let col = |name: &str, e: sqlx::Error| IndexError::QueryFailed(format!("{name} column: {e}"));

        let fingerprint: String = row.try_get("fingerprint").map_err(|e| col("fingerprint", e))?;
        let doc_id: String = row.try_get("doc_id").map_err(|e| col("doc_id", e))?;
        let position: i64 = row.try_get("position").map_err(|e| col("position", e))?;
        let offset: i64 = row.try_get("byte_offset").map_err(|e| col("byte_offset", e))?;
        let text: String = row.try_get("text").map_err(|e| col("text", e))?;
        let private: bool = row.try_get("private").map_err(|e| col("private", e))?;
        let metadata_json: String = row.try_get("metadata").map_err(|e| col("metadata", e))?;
        let blob: Vec<u8> = row.try_get("embedding").map_err(|e| col("embedding", e))?;

        let mut metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
            .map_err(|e| IndexError::QueryFailed(format!("metadata of {fingerprint}: {e}")))?;
        // The column is authoritative for filtering
        metadata.private = private;

        Ok(EmbeddingRecord {
            vector: vector::from_blob(&blob),
            chunk: Chunk {
                fingerprint,
                doc_id,
                position: position as usize,
                offset: offset as usize,
                text,
                metadata,
            },
        })
    }
}

/// A value bound into a generated query.
#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Text(String),
    Int(i64),
}

fn bind_value(value: &FilterValue) -> Bind {
    match value {
        FilterValue::Bool(b) => Bind::Int(i64::from(*b)),
        FilterValue::Text(s) => Bind::Text(s.clone()),
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::DocId => "doc_id",
        Field::Private => "private",
    }
}

/// Translate a filter into a `WHERE` expression plus its bind values.
fn filter_to_sql(filter: &QueryFilter) -> (String, Vec<Bind>) {
    let mut binds = Vec::new();
    if filter.clauses().is_empty() {
        return ("1".into(), binds);
    }

    let clauses: Vec<String> = filter
        .clauses()
        .iter()
        .map(|clause| {
            let parts: Vec<String> = clause
                .predicates()
                .iter()
                .map(|predicate| match predicate {
                    Predicate::Equals { field, value } => {
                        binds.push(bind_value(value));
                        format!("{} = ?", column(*field))
                    }
                    Predicate::NotEquals { field, value } => {
                        binds.push(bind_value(value));
                        format!("{} != ?", column(*field))
                    }
                    Predicate::In { values, .. } if values.is_empty() => "0".to_string(),
                    Predicate::In { field, values } => {
                        binds.extend(values.iter().map(bind_value));
                        let marks = vec!["?"; values.len()].join(", ");
                        format!("{} IN ({marks})", column(*field))
                    }
                })
                .collect();
            format!("({})", parts.join(" OR "))
        })
        .collect();

    (clauses.join(" AND "), binds)
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<(), IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("BEGIN failed: {e}")))?;

        for record in &records {
            let chunk = &record.chunk;
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| IndexError::Storage(format!("Metadata serialization: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO chunks (fingerprint, doc_id, position, byte_offset, text, private, metadata, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(fingerprint) DO UPDATE SET
                    doc_id = excluded.doc_id,
                    position = excluded.position,
                    byte_offset = excluded.byte_offset,
                    text = excluded.text,
                    private = excluded.private,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.fingerprint)
            .bind(&chunk.doc_id)
            .bind(chunk.position as i64)
            .bind(chunk.offset as i64)
            .bind(&chunk.text)
            .bind(chunk.metadata.private)
            .bind(&metadata)
            .bind(vector::to_blob(&record.vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("COMMIT failed: {e}")))?;
        debug!(count = records.len(), "Upserted chunk records");
        Ok(())
    }

    async fn delete(&self, fingerprints: &[String]) -> Result<(), IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("BEGIN failed: {e}")))?;

        for fp in fingerprints {
            sqlx::query("DELETE FROM chunks WHERE fingerprint = ?1")
                .bind(fp)
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexError::Storage(format!("DELETE failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("COMMIT failed: {e}")))?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        filter: &QueryFilter,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let (where_sql, binds) = filter_to_sql(filter);
        let sql = format!("SELECT * FROM chunks WHERE {where_sql}");

        let mut db_query = sqlx::query(&sql);
        for bind in binds {
            db_query = match bind {
                Bind::Text(s) => db_query.bind(s),
                Bind::Int(i) => db_query.bind(i),
            };
        }

        let rows = db_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Vector scan: {e}")))?;

        let records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        // Rows are pre-filtered; re-checking in Rust keeps both backends identical
        Ok(vector::rank(&records, query, filter, top_k))
    }

    async fn fingerprints_for(&self, doc_id: &str) -> Result<BTreeSet<String>, IndexError> {
        let rows = sqlx::query("SELECT fingerprint FROM chunks WHERE doc_id = ?1")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Fingerprint scan: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("fingerprint")
                    .map_err(|e| IndexError::QueryFailed(format!("fingerprint column: {e}")))
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| IndexError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}

#[async_trait]
impl DocumentStore for SqliteIndex {
    async fn fingerprints(&self, doc_id: &str) -> Result<BTreeSet<String>, IndexError> {
        let rows = sqlx::query("SELECT fingerprint FROM ledger WHERE doc_id = ?1")
            .bind(doc_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Ledger scan: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("fingerprint")
                    .map_err(|e| IndexError::QueryFailed(format!("fingerprint column: {e}")))
            })
            .collect()
    }

    async fn replace(
        &self,
        doc_id: &str,
        fingerprints: BTreeSet<String>,
    ) -> Result<(), IndexError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM ledger WHERE doc_id = ?1")
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexError::Storage(format!("Ledger DELETE failed: {e}")))?;

        for fp in &fingerprints {
            sqlx::query("INSERT INTO ledger (doc_id, fingerprint) VALUES (?1, ?2)")
                .bind(doc_id)
                .bind(fp)
                .execute(&mut *tx)
                .await
                .map_err(|e| IndexError::Storage(format!("Ledger INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexError::Storage(format!("COMMIT failed: {e}")))?;
        Ok(())
    }

    async fn remove(&self, doc_id: &str) -> Result<(), IndexError> {
        sqlx::query("DELETE FROM ledger WHERE doc_id = ?1")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("Ledger DELETE failed: {e}")))?;
        Ok(())
    }

    async fn doc_ids(&self) -> Result<Vec<String>, IndexError> {
        let rows = sqlx::query("SELECT DISTINCT doc_id FROM ledger ORDER BY doc_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexError::QueryFailed(format!("Ledger doc_ids: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("doc_id")
                    .map_err(|e| IndexError::QueryFailed(format!("doc_id column: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::tests::record;
    use docsage_core::filter::{QueryFilterBuilder, VisibilityPolicy};

    async fn test_index() -> (SqliteIndex, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let index = SqliteIndex::open(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        (index, dir)
    }

    #[tokio::test]
    async fn upsert_search_roundtrip() {
        let (index, _dir) = test_index().await;
        index
            .upsert(vec![
                record("a", "letters.md", false, vec![1.0, 0.0]),
                record("b", "other.md", false, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.1], &QueryFilter::match_all(), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.fingerprint, "a");
        assert_eq!(hits[0].chunk.text, "text of a");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn upsert_same_fingerprint_does_not_duplicate() {
        let (index, _dir) = test_index().await;
        let r = record("a", "d", false, vec![1.0]);
        index.upsert(vec![r.clone()]).await.unwrap();
        index.upsert(vec![r]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filter_is_applied_in_sql() {
        let (index, _dir) = test_index().await;
        index
            .upsert(vec![
                record("p", "public.md", false, vec![1.0, 0.0]),
                record("s1", "secret.md", true, vec![1.0, 0.0]),
                record("s2", "other-secret.md", true, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let public = QueryFilterBuilder::default().build().unwrap();
        let hits = index.search(&[1.0, 0.0], &public, 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        let allowed = QueryFilterBuilder::default()
            .allow(["secret.md"])
            .build()
            .unwrap();
        let mut docs: Vec<_> = index
            .search(&[1.0, 0.0], &allowed, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.chunk.doc_id)
            .collect();
        docs.sort();
        assert_eq!(docs, vec!["public.md", "secret.md"]);
    }

    #[tokio::test]
    async fn nonexistent_allow_list_returns_nothing() {
        let (index, _dir) = test_index().await;
        index
            .upsert(vec![record("p", "public.md", false, vec![1.0])])
            .await
            .unwrap();
        let filter = QueryFilterBuilder::new(VisibilityPolicy::ScopeToAllowList)
            .allow(["missing.md"])
            .build()
            .unwrap();
        assert!(index.search(&[1.0], &filter, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_and_fingerprints_for() {
        let (index, _dir) = test_index().await;
        index
            .upsert(vec![
                record("a", "d", false, vec![1.0]),
                record("b", "d", false, vec![1.0]),
                record("c", "e", false, vec![1.0]),
            ])
            .await
            .unwrap();
        index.delete(&["a".to_string()]).await.unwrap();
        let fps: Vec<_> = index.fingerprints_for("d").await.unwrap().into_iter().collect();
        assert_eq!(fps, vec!["b"]);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ledger_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("index.db").display());
        {
            let index = SqliteIndex::open(&url).await.unwrap();
            index
                .replace("letters.md", ["f1".to_string(), "f2".to_string()].into())
                .await
                .unwrap();
        }
        let index = SqliteIndex::open(&url).await.unwrap();
        assert_eq!(index.fingerprints("letters.md").await.unwrap().len(), 2);
        assert_eq!(index.doc_ids().await.unwrap(), vec!["letters.md"]);

        index.replace("letters.md", BTreeSet::new()).await.unwrap();
        assert!(index.doc_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_database_works() {
        let index = SqliteIndex::in_memory().await.unwrap();
        index
            .upsert(vec![record("a", "d", false, vec![1.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[test]
    fn filter_translation() {
        let filter = QueryFilterBuilder::default()
            .allow(["a.md", "b.md"])
            .build()
            .unwrap();
        let (sql, binds) = filter_to_sql(&filter);
        assert_eq!(sql, "(private != ? OR doc_id IN (?, ?))");
        assert_eq!(
            binds,
            vec![
                Bind::Int(1),
                Bind::Text("a.md".into()),
                Bind::Text("b.md".into())
            ]
        );

        assert_eq!(filter_to_sql(&QueryFilter::match_all()).0, "1");

        let empty_restrict = QueryFilterBuilder::default()
            .restrict_to(Vec::<String>::new())
            .build()
            .unwrap();
        assert_eq!(filter_to_sql(&empty_restrict).0, "(private != ?) AND (0)");
    }
}
