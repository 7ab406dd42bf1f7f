//! SQLite delivery job storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, FromRow};
use uuid::Uuid;

use crate::crypto::Hash256;
use crate::domain::{
    ActionType, DeliveryJob, DeliveryMethod, DeliveryStatistics, DeliveryStatus, JobId, Platform,
    PolicyId, SubjectId,
};
use crate::infra::{JobStore, Result, TrustError};

use super::{fmt_ts, parse_hash, parse_ts};

/// SQLite-backed delivery job store.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        Ok(Self::new(pool))
    }

    /// Create the jobs table and its indexes if they do not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delivery_jobs (
                id TEXT PRIMARY KEY,
                policy_id TEXT NOT NULL,
                subject_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                action_type TEXT NOT NULL,
                method TEXT NOT NULL,
                rendered_payload TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                status TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                next_attempt_at TEXT,
                lease_expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,

                CONSTRAINT uq_delivery_jobs_idempotency UNIQUE (idempotency_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Sweeper scan path
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_delivery_jobs_due
            ON delivery_jobs (status, next_attempt_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_delivery_jobs_policy
            ON delivery_jobs (policy_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &DeliveryJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_jobs (
                id, policy_id, subject_id, platform, action_type, method,
                rendered_payload, idempotency_key, status, attempt_count,
                last_error, next_attempt_at, lease_expires_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.policy_id.to_string())
        .bind(job.subject_id.to_string())
        .bind(job.platform.as_str())
        .bind(job.action_type.as_str())
        .bind(job.method.as_str())
        .bind(&job.rendered_payload)
        .bind(hex::encode(job.idempotency_key))
        .bind(job.status.as_str())
        .bind(job.attempt_count as i64)
        .bind(&job.last_error)
        .bind(job.next_attempt_at.map(fmt_ts))
        .bind(job.lease_expires_at.map(fmt_ts))
        .bind(fmt_ts(job.created_at))
        .bind(fmt_ts(job.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, policy_id, subject_id, platform, action_type, method,
                   rendered_payload, idempotency_key, status, attempt_count,
                   last_error, next_attempt_at, lease_expires_at,
                   created_at, updated_at
            FROM delivery_jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeliveryJob::try_from).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &Hash256) -> Result<Option<DeliveryJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, policy_id, subject_id, platform, action_type, method,
                   rendered_payload, idempotency_key, status, attempt_count,
                   last_error, next_attempt_at, lease_expires_at,
                   created_at, updated_at
            FROM delivery_jobs
            WHERE idempotency_key = ?
            "#,
        )
        .bind(hex::encode(key))
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeliveryJob::try_from).transpose()
    }

    async fn update(&self, job: &DeliveryJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_jobs SET
                status = ?, attempt_count = ?, last_error = ?,
                next_attempt_at = ?, lease_expires_at = ?,
                rendered_payload = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.attempt_count as i64)
        .bind(&job.last_error)
        .bind(job.next_attempt_at.map(fmt_ts))
        .bind(job.lease_expires_at.map(fmt_ts))
        .bind(&job.rendered_payload)
        .bind(fmt_ts(job.updated_at))
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TrustError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn claim(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<DeliveryJob>> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_jobs
            SET lease_expires_at = ?, updated_at = ?
            WHERE id = ?
              AND status = 'pending'
              AND (lease_expires_at IS NULL OR lease_expires_at <= ?)
            "#,
        )
        .bind(fmt_ts(lease_until))
        .bind(fmt_ts(now))
        .bind(id.to_string())
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DeliveryJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, policy_id, subject_id, platform, action_type, method,
                   rendered_payload, idempotency_key, status, attempt_count,
                   last_error, next_attempt_at, lease_expires_at,
                   created_at, updated_at
            FROM delivery_jobs
            WHERE status = 'retry' AND next_attempt_at IS NOT NULL AND next_attempt_at <= ?
            ORDER BY next_attempt_at ASC
            LIMIT ?
            "#,
        )
        .bind(fmt_ts(now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryJob::try_from).collect()
    }

    async fn claimable_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DeliveryJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, policy_id, subject_id, platform, action_type, method,
                   rendered_payload, idempotency_key, status, attempt_count,
                   last_error, next_attempt_at, lease_expires_at,
                   created_at, updated_at
            FROM delivery_jobs
            WHERE status = 'pending'
              AND (lease_expires_at IS NULL OR lease_expires_at <= ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(fmt_ts(now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryJob::try_from).collect()
    }

    async fn stale_sent(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<DeliveryJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, policy_id, subject_id, platform, action_type, method,
                   rendered_payload, idempotency_key, status, attempt_count,
                   last_error, next_attempt_at, lease_expires_at,
                   created_at, updated_at
            FROM delivery_jobs
            WHERE status = 'sent' AND updated_at <= ?
            ORDER BY updated_at ASC
            LIMIT ?
            "#,
        )
        .bind(fmt_ts(cutoff))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryJob::try_from).collect()
    }

    async fn statistics(&self, since: DateTime<Utc>) -> Result<DeliveryStatistics> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM delivery_jobs
            WHERE created_at >= ?
            GROUP BY status
            "#,
        )
        .bind(fmt_ts(since))
        .fetch_all(&self.pool)
        .await?;

        let by_platform: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT platform, COUNT(*) FROM delivery_jobs
            WHERE created_at >= ?
            GROUP BY platform
            "#,
        )
        .bind(fmt_ts(since))
        .fetch_all(&self.pool)
        .await?;

        let by_method: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT method, COUNT(*) FROM delivery_jobs
            WHERE created_at >= ?
            GROUP BY method
            "#,
        )
        .bind(fmt_ts(since))
        .fetch_all(&self.pool)
        .await?;

        let mut stats = DeliveryStatistics::default();
        for (status, count) in by_status {
            let count = count as u64;
            stats.total += count;
            match DeliveryStatus::parse(&status) {
                Some(DeliveryStatus::Sent) => stats.sent += count,
                Some(DeliveryStatus::Delivered) => stats.delivered += count,
                Some(DeliveryStatus::Failed) | Some(DeliveryStatus::Retry) => {
                    stats.failed += count
                }
                Some(DeliveryStatus::Expired) => stats.expired += count,
                Some(DeliveryStatus::Pending) => stats.pending += count,
                None => {
                    return Err(TrustError::Internal(format!(
                        "unknown job status in store: {status}"
                    )))
                }
            }
        }
        stats.by_platform = by_platform
            .into_iter()
            .map(|(platform, count)| (platform, count as u64))
            .collect();
        stats.by_method = by_method
            .into_iter()
            .map(|(method, count)| (method, count as u64))
            .collect();

        if stats.total > 0 {
            stats.success_rate = (stats.sent + stats.delivered) as f64 / stats.total as f64;
        }
        Ok(stats)
    }
}

/// Raw row from the delivery_jobs table
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    policy_id: String,
    subject_id: String,
    platform: String,
    action_type: String,
    method: String,
    rendered_payload: String,
    idempotency_key: String,
    status: String,
    attempt_count: i64,
    last_error: Option<String>,
    next_attempt_at: Option<String>,
    lease_expires_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<JobRow> for DeliveryJob {
    type Error = TrustError;

    fn try_from(row: JobRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| TrustError::Internal(format!("invalid job id: {e}")))?;
        let policy_id = Uuid::parse_str(&row.policy_id)
            .map_err(|e| TrustError::Internal(format!("invalid policy_id: {e}")))?;
        let subject_id = Uuid::parse_str(&row.subject_id)
            .map_err(|e| TrustError::Internal(format!("invalid subject_id: {e}")))?;

        let action_type = ActionType::parse(&row.action_type)
            .ok_or_else(|| TrustError::Internal(format!("invalid action_type: {}", row.action_type)))?;
        let method = DeliveryMethod::parse(&row.method)
            .ok_or_else(|| TrustError::Internal(format!("invalid method: {}", row.method)))?;
        let status = DeliveryStatus::parse(&row.status)
            .ok_or_else(|| TrustError::Internal(format!("invalid status: {}", row.status)))?;

        Ok(DeliveryJob {
            id: JobId::from_uuid(id),
            policy_id: PolicyId::from_uuid(policy_id),
            subject_id: SubjectId::from_uuid(subject_id),
            platform: Platform::new(row.platform),
            action_type,
            method,
            rendered_payload: row.rendered_payload,
            idempotency_key: parse_hash(&row.idempotency_key)?,
            status,
            attempt_count: row.attempt_count as u32,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at.as_deref().map(parse_ts).transpose()?,
            lease_expires_at: row.lease_expires_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
