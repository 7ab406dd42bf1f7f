//! SQLite chain record storage.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, FromRow};

use crate::crypto::Hash256;
use crate::infra::{ChainRecord, ChainStore, Result, TrustError};

use super::{fmt_ts, parse_hash, parse_ts};

/// SQLite-backed append-only chain store.
pub struct SqliteChainStore {
    pool: SqlitePool,
}

impl SqliteChainStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        Ok(Self::new(pool))
    }

    /// Create the chain table if it does not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chain_entries (
                chain_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                prev_hash TEXT NOT NULL,
                entry_hash TEXT NOT NULL,
                payload TEXT NOT NULL,
                appended_at TEXT NOT NULL,

                PRIMARY KEY (chain_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChainStore for SqliteChainStore {
    async fn append(&self, chain_id: &str, record: ChainRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO chain_entries (
                chain_id, sequence, prev_hash, entry_hash, payload, appended_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chain_id)
        .bind(record.sequence as i64)
        .bind(hex::encode(record.prev_hash))
        .bind(hex::encode(record.entry_hash))
        .bind(&record.payload)
        .bind(fmt_ts(record.appended_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // A taken (chain_id, sequence) slot means two writers raced
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(TrustError::ChainConflict {
                    chain_id: chain_id.to_string(),
                    sequence: record.sequence,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn head(&self, chain_id: &str) -> Result<Option<(u64, Hash256)>> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT sequence, entry_hash FROM chain_entries
            WHERE chain_id = ?
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((sequence, entry_hash)) => {
                Ok(Some((sequence as u64, parse_hash(&entry_hash)?)))
            }
            None => Ok(None),
        }
    }

    async fn read_range(&self, chain_id: &str, from: u64, to: u64) -> Result<Vec<ChainRecord>> {
        let rows = sqlx::query_as::<_, ChainRow>(
            r#"
            SELECT sequence, prev_hash, entry_hash, payload, appended_at
            FROM chain_entries
            WHERE chain_id = ? AND sequence >= ? AND sequence <= ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(chain_id)
        .bind(from as i64)
        .bind(to as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChainRecord::try_from).collect()
    }

    async fn read_after(
        &self,
        chain_id: &str,
        cursor: u64,
        limit: u32,
    ) -> Result<Vec<ChainRecord>> {
        let rows = sqlx::query_as::<_, ChainRow>(
            r#"
            SELECT sequence, prev_hash, entry_hash, payload, appended_at
            FROM chain_entries
            WHERE chain_id = ? AND sequence > ?
            ORDER BY sequence ASC
            LIMIT ?
            "#,
        )
        .bind(chain_id)
        .bind(cursor as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChainRecord::try_from).collect()
    }
}

/// Raw row from the chain_entries table
#[derive(Debug, FromRow)]
struct ChainRow {
    sequence: i64,
    prev_hash: String,
    entry_hash: String,
    payload: String,
    appended_at: String,
}

impl TryFrom<ChainRow> for ChainRecord {
    type Error = TrustError;

    fn try_from(row: ChainRow) -> Result<Self> {
        Ok(ChainRecord {
            sequence: row.sequence as u64,
            prev_hash: parse_hash(&row.prev_hash)?,
            entry_hash: parse_hash(&row.entry_hash)?,
            payload: row.payload,
            appended_at: parse_ts(&row.appended_at)?,
        })
    }
}
