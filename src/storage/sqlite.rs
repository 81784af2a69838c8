//! SQLite record store
//!
//! Batch and seal records are stored as JSON documents next to the columns
//! the subsystem queries on (batch number, creation time, seal state).

use super::{BatchRecordStore, SealStore};
use crate::anchoring::{SealRecord, SealStateKind};
use crate::error::{AnchorError, Result};
use crate::SealableBatch;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if missing) the database at `url` and ensure the schema
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // an in-memory database only exists on the connection that created it
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        info!("Record store ready at {}", url);
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sealable_batches (
                batch_number INTEGER PRIMARY KEY,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS sealable_batches_created_at ON sealable_batches(created_at DESC);"#,
            r#"
            CREATE TABLE IF NOT EXISTS seals (
                link TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                data TEXT NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS seals_state ON seals(state);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn batch_number_column(number: u64) -> Result<i64> {
        i64::try_from(number)
            .map_err(|_| AnchorError::InvalidInput(format!("batch number {} out of range", number)))
    }

    fn decode<T: serde::de::DeserializeOwned>(row: &sqlx::sqlite::SqliteRow) -> Result<T> {
        let data: String = row.try_get("data")?;
        Ok(serde_json::from_str(&data)?)
    }
}

const UPSERT_SEAL: &str = r#"
    INSERT INTO seals (link, state, created_at, data)
    VALUES (?, ?, ?, ?)
    ON CONFLICT (link)
    DO UPDATE SET state = excluded.state, data = excluded.data
"#;

#[async_trait]
impl BatchRecordStore for SqliteRecordStore {
    async fn latest_batch(&self) -> Result<Option<SealableBatch>> {
        let row = sqlx::query(
            "SELECT data FROM sealable_batches ORDER BY created_at DESC, batch_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn insert_batch(&self, batch: &SealableBatch, created_at: i64) -> Result<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sealable_batches (batch_number, created_at, data) VALUES (?, ?, ?)",
        )
        .bind(Self::batch_number_column(batch.batch_number)?)
        .bind(created_at)
        .bind(serde_json::to_string(batch)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AnchorError::Conflict(format!(
                "batch {} already exists",
                batch.batch_number
            )));
        }
        debug!("Inserted sealable batch {}", batch.batch_number);
        Ok(())
    }

    async fn batch_range(&self, from: u64, to: u64) -> Result<Vec<SealableBatch>> {
        if from > to {
            return Ok(Vec::new());
        }
        // numbers beyond i64 cannot have been stored
        let to = i64::try_from(to).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT data FROM sealable_batches WHERE batch_number >= ? AND batch_number <= ? ORDER BY batch_number",
        )
        .bind(Self::batch_number_column(from)?)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl SealStore for SqliteRecordStore {
    async fn get_seal(&self, link: &str) -> Result<Option<SealRecord>> {
        let row = sqlx::query("SELECT data FROM seals WHERE link = ?")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn insert_seal(&self, record: &SealRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO seals (link, state, created_at, data) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.link)
        .bind(record.kind().as_str())
        .bind(record.created_at)
        .bind(serde_json::to_string(record)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn put_seal(&self, record: &SealRecord) -> Result<()> {
        sqlx::query(UPSERT_SEAL)
            .bind(&record.link)
            .bind(record.kind().as_str())
            .bind(record.created_at)
            .bind(serde_json::to_string(record)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_seals(&self, records: &[SealRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(UPSERT_SEAL)
                .bind(&record.link)
                .bind(record.kind().as_str())
                .bind(record.created_at)
                .bind(serde_json::to_string(record)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_seals(&self, kinds: &[SealStateKind]) -> Result<Vec<SealRecord>> {
        let mut records = Vec::new();
        for kind in kinds {
            let rows = sqlx::query("SELECT data FROM seals WHERE state = ? ORDER BY created_at, link")
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?;
            for row in &rows {
                records.push(Self::decode(row)?);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::{SealIntent, SealState};

    async fn store() -> SqliteRecordStore {
        SqliteRecordStore::connect("sqlite::memory:").await.unwrap()
    }

    fn seal(link: &str, state: SealState) -> SealRecord {
        SealRecord {
            link: link.to_string(),
            permalink: link.to_string(),
            address: Some(format!("0x{}", link)),
            base_pub_key: "02ab".to_string(),
            counterparty: None,
            blockchain: "ethereum".to_string(),
            network: "mock".to_string(),
            intent: SealIntent::Write,
            state,
            created_at: 10,
            sealed_at: None,
            updated_at: 10,
        }
    }

    #[tokio::test]
    async fn test_batches_latest_and_range() {
        let store = store().await;
        assert!(store.latest_batch().await.unwrap().is_none());

        let full = SealableBatch {
            batch_number: 1,
            merkle_root: Some("root".to_string()),
            from_timestamp: Some(5),
            ..Default::default()
        };
        store.insert_batch(&SealableBatch::empty(0), 100).await.unwrap();
        store.insert_batch(&full, 200).await.unwrap();

        assert_eq!(store.latest_batch().await.unwrap(), Some(full.clone()));
        assert_eq!(store.batch_range(0, 10).await.unwrap().len(), 2);
        assert_eq!(store.batch_range(1, 1).await.unwrap(), vec![full]);
    }

    #[tokio::test]
    async fn test_batch_number_is_unique() {
        let store = store().await;
        store.insert_batch(&SealableBatch::empty(0), 1).await.unwrap();
        let result = store.insert_batch(&SealableBatch::empty(0), 2).await;
        assert!(matches!(result, Err(AnchorError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_seal_insert_is_idempotent_per_link() {
        let store = store().await;
        assert!(store.insert_seal(&seal("aa", SealState::Unsealed)).await.unwrap());
        assert!(!store.insert_seal(&seal("aa", SealState::Watched)).await.unwrap());

        let stored = store.get_seal("aa").await.unwrap().unwrap();
        assert_eq!(stored.state, SealState::Unsealed);
    }

    #[tokio::test]
    async fn test_put_seals_updates_state_index() {
        let store = store().await;
        store.put_seal(&seal("aa", SealState::Unsealed)).await.unwrap();
        store.put_seal(&seal("bb", SealState::Unsealed)).await.unwrap();

        let sealed = vec![
            seal("aa", SealState::Sealed { tx_id: "t1".to_string() }),
            seal("bb", SealState::Sealed { tx_id: "t2".to_string() }),
        ];
        store.put_seals(&sealed).await.unwrap();

        assert!(store.list_seals(&[SealStateKind::Unsealed]).await.unwrap().is_empty());
        let listed = store.list_seals(&[SealStateKind::Sealed]).await.unwrap();
        assert_eq!(listed, sealed);
    }
}
