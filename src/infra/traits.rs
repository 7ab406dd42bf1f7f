//! Storage trait definitions for the trust and delivery subsystem.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::crypto::Hash256;
use crate::domain::{DeliveryJob, DeliveryStatistics, JobId};

use super::Result;

/// One stored link of a hash chain.
///
/// `payload` is the canonical serialization the entry hash commits to;
/// verification recomputes `entry_hash` from `prev_hash` and these exact
/// bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainRecord {
    /// Position in the chain, monotonically assigned from 1
    pub sequence: u64,
    pub prev_hash: Hash256,
    pub entry_hash: Hash256,
    /// Canonical JSON preimage of the entry
    pub payload: String,
    pub appended_at: DateTime<Utc>,
}

/// Append-only persistence for hash chain records.
///
/// Implementations must reject a second record at an existing
/// `(chain_id, sequence)`: that is the write-write race the single-writer
/// discipline exists to prevent, and the store is the last line of defense.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Durably append one record. Fails with `ChainConflict` if the
    /// sequence slot is already taken, `StoreUnavailable` if the commit
    /// cannot be made durable.
    async fn append(&self, chain_id: &str, record: ChainRecord) -> Result<()>;

    /// Highest sequence and its entry hash, or `None` for an empty chain.
    async fn head(&self, chain_id: &str) -> Result<Option<(u64, Hash256)>>;

    /// Read records with `from <= sequence <= to`, ascending.
    async fn read_range(&self, chain_id: &str, from: u64, to: u64) -> Result<Vec<ChainRecord>>;

    /// Read up to `limit` records with `sequence > cursor`, ascending.
    /// Cursor 0 starts from the beginning.
    async fn read_after(&self, chain_id: &str, cursor: u64, limit: u32)
        -> Result<Vec<ChainRecord>>;
}

/// Durable storage for delivery jobs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. The `idempotency_key` uniqueness constraint is the
    /// backstop against duplicate logical notifications.
    async fn insert(&self, job: &DeliveryJob) -> Result<()>;

    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>>;

    async fn find_by_idempotency_key(&self, key: &Hash256) -> Result<Option<DeliveryJob>>;

    /// Persist the job's current state by id.
    async fn update(&self, job: &DeliveryJob) -> Result<()>;

    /// Atomically claim a pending job whose lease is unset or lapsed,
    /// extending the lease to `lease_until`. Returns `None` if the job is
    /// not claimable (already leased, wrong state, or missing).
    async fn claim(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<DeliveryJob>>;

    /// Jobs in `retry` whose `next_attempt_at <= now`, oldest first.
    async fn due_retries(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DeliveryJob>>;

    /// Jobs in `pending` with no live lease, oldest first: the work the
    /// sweeper hands to the worker pool.
    async fn claimable_pending(&self, now: DateTime<Utc>, limit: u32)
        -> Result<Vec<DeliveryJob>>;

    /// Jobs in `sent` not updated since `cutoff`; their acknowledgment
    /// window has lapsed and they re-enter the retry path.
    async fn stale_sent(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<DeliveryJob>>;

    /// Aggregate counts over jobs created at or after `since`.
    async fn statistics(&self, since: DateTime<Utc>) -> Result<DeliveryStatistics>;
}
