//! Local Metadata Store using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    metadata::{LocalMetadataStore, LocalRecord},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::Path;
use tracing::debug;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS local_records (
        path TEXT PRIMARY KEY,
        fingerprint TEXT NOT NULL,
        size INTEGER NOT NULL,
        synced_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed local metadata store
///
/// One row per synchronized item, keyed by relative path.
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Open (or create) the database file at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self { pool };
        store.initialize().await?;

        debug!(path = ?db_path, "Initialized local metadata store");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A single connection, otherwise every pooled connection gets its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> LocalRecord {
        let size: i64 = row.get("size");
        LocalRecord {
            path: row.get("path"),
            fingerprint: row.get("fingerprint"),
            size: size.max(0) as u64,
            synced_at: row.get("synced_at"),
        }
    }
}

#[async_trait]
impl LocalMetadataStore for SqliteMetadataStore {
    async fn all_records(&self) -> Result<Vec<LocalRecord>> {
        let rows = sqlx::query(
            "SELECT path, fingerprint, size, synced_at FROM local_records ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to list records: {}", e)))?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn get_record(&self, path: &str) -> Result<Option<LocalRecord>> {
        let row = sqlx::query(
            "SELECT path, fingerprint, size, synced_at FROM local_records WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to get record: {}", e)))?;

        Ok(row.as_ref().map(Self::row_to_record))
    }

    async fn upsert_record(&self, record: &LocalRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_records (path, fingerprint, size, synced_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                size = excluded.size,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&record.path)
        .bind(&record.fingerprint)
        .bind(record.size as i64)
        .bind(record.synced_at)
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to upsert record: {}", e)))?;

        debug!(path = %record.path, "Stored local record");
        Ok(())
    }

    async fn rename_record(&self, old_path: &str, new_path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            BridgeError::DatabaseError(format!("Failed to begin transaction: {}", e))
        })?;

        // The destination may hold a record from an earlier sync; the moved one wins.
        sqlx::query("DELETE FROM local_records WHERE path = ? AND EXISTS (SELECT 1 FROM local_records WHERE path = ?)")
            .bind(new_path)
            .bind(old_path)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to rename record: {}", e)))?;

        let result = sqlx::query("UPDATE local_records SET path = ? WHERE path = ?")
            .bind(new_path)
            .bind(old_path)
            .execute(&mut *tx)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to rename record: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to commit: {}", e)))?;

        let renamed = result.rows_affected() > 0;
        debug!(old_path, new_path, renamed, "Renamed local record");
        Ok(renamed)
    }

    async fn delete_record(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_records WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to delete record: {}", e)))?;

        debug!(path, "Deleted local record");
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();

        store
            .upsert_record(&LocalRecord::new("a.txt", "aa", 1, 100))
            .await
            .unwrap();
        store
            .upsert_record(&LocalRecord::new("a.txt", "bb", 2, 200))
            .await
            .unwrap();

        let record = store.get_record("a.txt").await.unwrap().unwrap();
        assert_eq!(record, LocalRecord::new("a.txt", "bb", 2, 200));
        assert!(store.get_record("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_records_ordered() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();

        for path in ["c.txt", "a.txt", "b/d.txt"] {
            store
                .upsert_record(&LocalRecord::new(path, "ff", 0, 0))
                .await
                .unwrap();
        }

        let paths: Vec<String> = store
            .all_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["a.txt", "b/d.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_rename_record() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        store
            .upsert_record(&LocalRecord::new("x.txt", "11", 3, 0))
            .await
            .unwrap();
        store
            .upsert_record(&LocalRecord::new("y.txt", "22", 4, 0))
            .await
            .unwrap();

        assert!(store.rename_record("x.txt", "y.txt").await.unwrap());
        assert!(store.get_record("x.txt").await.unwrap().is_none());
        assert_eq!(
            store.get_record("y.txt").await.unwrap().unwrap().fingerprint,
            "11"
        );

        assert!(!store.rename_record("x.txt", "z.txt").await.unwrap());
        assert!(store.get_record("y.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_record() {
        let store = SqliteMetadataStore::in_memory().await.unwrap();
        store
            .upsert_record(&LocalRecord::new("a.txt", "aa", 1, 0))
            .await
            .unwrap();

        assert!(store.delete_record("a.txt").await.unwrap());
        assert!(!store.delete_record("a.txt").await.unwrap());
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join(".ignore/local.db");

        {
            let store = SqliteMetadataStore::open(&db_path).await.unwrap();
            store
                .upsert_record(&LocalRecord::new("kept.txt", "aa", 1, 0))
                .await
                .unwrap();
        }

        let store = SqliteMetadataStore::open(&db_path).await.unwrap();
        assert!(store.get_record("kept.txt").await.unwrap().is_some());
    }
}
