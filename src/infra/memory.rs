//! In-memory store implementations for embedding and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::crypto::Hash256;
use crate::domain::{DeliveryJob, DeliveryStatistics, DeliveryStatus, JobId};

use super::{ChainRecord, ChainStore, JobStore, Result, TrustError};

/// In-memory append-only chain store.
pub struct InMemoryChainStore {
    chains: RwLock<HashMap<String, Vec<ChainRecord>>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// Test hook simulating an out-of-band modification of stored state,
    /// which `verify` must detect. Returns false if the record is absent.
    pub async fn tamper_with<F>(&self, chain_id: &str, sequence: u64, mutate: F) -> bool
    where
        F: FnOnce(&mut ChainRecord),
    {
        let mut chains = self.chains.write().await;
        match chains
            .get_mut(chain_id)
            .and_then(|records| records.iter_mut().find(|r| r.sequence == sequence))
        {
            Some(record) => {
                mutate(record);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryChainStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainStore for InMemoryChainStore {
    async fn append(&self, chain_id: &str, record: ChainRecord) -> Result<()> {
        let mut chains = self.chains.write().await;
        let records = chains.entry(chain_id.to_string()).or_default();

        let expected = records.last().map(|r| r.sequence + 1).unwrap_or(1);
        if record.sequence != expected {
            return Err(TrustError::ChainConflict {
                chain_id: chain_id.to_string(),
                sequence: record.sequence,
            });
        }

        records.push(record);
        Ok(())
    }

    async fn head(&self, chain_id: &str) -> Result<Option<(u64, Hash256)>> {
        let chains = self.chains.read().await;
        Ok(chains
            .get(chain_id)
            .and_then(|records| records.last())
            .map(|r| (r.sequence, r.entry_hash)))
    }

    async fn read_range(&self, chain_id: &str, from: u64, to: u64) -> Result<Vec<ChainRecord>> {
        let chains = self.chains.read().await;
        Ok(chains
            .get(chain_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.sequence >= from && r.sequence <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_after(
        &self,
        chain_id: &str,
        cursor: u64,
        limit: u32,
    ) -> Result<Vec<ChainRecord>> {
        let chains = self.chains.read().await;
        Ok(chains
            .get(chain_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.sequence > cursor)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory delivery job store.
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, DeliveryJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of stored jobs (duplicate detection in tests).
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &DeliveryJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs
            .values()
            .any(|existing| existing.idempotency_key == job.idempotency_key)
        {
            return Err(TrustError::Internal(format!(
                "duplicate idempotency key for job {}",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &Hash256) -> Result<Option<DeliveryJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|job| &job.idempotency_key == key)
            .cloned())
    }

    async fn update(&self, job: &DeliveryJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(TrustError::JobNotFound(job.id)),
        }
    }

    async fn claim(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<DeliveryJob>> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.is_claimable(now) => {
                job.lease_expires_at = Some(lease_until);
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn due_retries(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DeliveryJob>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<DeliveryJob> = jobs
            .values()
            .filter(|job| {
                job.status == DeliveryStatus::Retry
                    && job.next_attempt_at.map_or(false, |at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|job| job.next_attempt_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn claimable_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DeliveryJob>> {
        let jobs = self.jobs.read().await;
        let mut claimable: Vec<DeliveryJob> = jobs
            .values()
            .filter(|job| job.is_claimable(now))
            .cloned()
            .collect();
        claimable.sort_by_key(|job| job.created_at);
        claimable.truncate(limit as usize);
        Ok(claimable)
    }

    async fn stale_sent(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<DeliveryJob>> {
        let jobs = self.jobs.read().await;
        let mut stale: Vec<DeliveryJob> = jobs
            .values()
            .filter(|job| job.status == DeliveryStatus::Sent && job.updated_at <= cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|job| job.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn statistics(&self, since: DateTime<Utc>) -> Result<DeliveryStatistics> {
        let jobs = self.jobs.read().await;
        let mut stats = DeliveryStatistics::default();

        for job in jobs.values().filter(|job| job.created_at >= since) {
            stats.total += 1;
            match job.status {
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Delivered => stats.delivered += 1,
                DeliveryStatus::Failed | DeliveryStatus::Retry => stats.failed += 1,
                DeliveryStatus::Expired => stats.expired += 1,
                DeliveryStatus::Pending => stats.pending += 1,
            }
            *stats
                .by_platform
                .entry(job.platform.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_method
                .entry(job.method.as_str().to_string())
                .or_insert(0) += 1;
        }

        if stats.total > 0 {
            stats.success_rate = (stats.sent + stats.delivered) as f64 / stats.total as f64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{chain_entry_hash, genesis_prev_hash};
    use crate::domain::{ActionType, DeliveryMethod, Platform, PolicyId, SubjectId};

    fn record(sequence: u64, prev_hash: Hash256, payload: &str) -> ChainRecord {
        ChainRecord {
            sequence,
            prev_hash,
            entry_hash: chain_entry_hash(&prev_hash, payload.as_bytes()),
            payload: payload.to_string(),
            appended_at: Utc::now(),
        }
    }

    fn job(status: DeliveryStatus, key_byte: u8) -> DeliveryJob {
        let now = Utc::now();
        DeliveryJob {
            id: JobId::new(),
            policy_id: PolicyId::new(),
            subject_id: SubjectId::new(),
            platform: Platform::google(),
            action_type: ActionType::Delete,
            method: DeliveryMethod::Email,
            rendered_payload: "{}".to_string(),
            idempotency_key: [key_byte; 32],
            status,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_chain_append_and_head() {
        let store = InMemoryChainStore::new();
        let genesis = genesis_prev_hash();

        assert!(store.head("subject-1").await.unwrap().is_none());

        let r1 = record(1, genesis, "first");
        store.append("subject-1", r1.clone()).await.unwrap();

        let (seq, hash) = store.head("subject-1").await.unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(hash, r1.entry_hash);
    }

    #[tokio::test]
    async fn test_chain_rejects_sequence_gap() {
        let store = InMemoryChainStore::new();
        let genesis = genesis_prev_hash();

        store.append("c", record(1, genesis, "a")).await.unwrap();

        let err = store.append("c", record(3, genesis, "b")).await.unwrap_err();
        assert!(matches!(err, TrustError::ChainConflict { sequence: 3, .. }));

        // Duplicate slot also rejected
        let err = store.append("c", record(1, genesis, "b")).await.unwrap_err();
        assert!(matches!(err, TrustError::ChainConflict { sequence: 1, .. }));
    }

    #[tokio::test]
    async fn test_chain_read_after_cursor() {
        let store = InMemoryChainStore::new();
        let mut prev = genesis_prev_hash();
        for i in 1..=5 {
            let r = record(i, prev, &format!("payload-{i}"));
            prev = r.entry_hash;
            store.append("c", r).await.unwrap();
        }

        let page = store.read_after("c", 2, 2).await.unwrap();
        assert_eq!(
            page.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    #[tokio::test]
    async fn test_job_insert_rejects_duplicate_key() {
        let store = InMemoryJobStore::new();
        store.insert(&job(DeliveryStatus::Pending, 1)).await.unwrap();
        assert!(store.insert(&job(DeliveryStatus::Pending, 1)).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_job_claim_is_exclusive() {
        let store = InMemoryJobStore::new();
        let j = job(DeliveryStatus::Pending, 2);
        store.insert(&j).await.unwrap();

        let now = Utc::now();
        let lease_until = now + chrono::Duration::seconds(60);

        let claimed = store.claim(j.id, now, lease_until).await.unwrap();
        assert!(claimed.is_some());

        // Second claim inside the lease window fails
        let reclaimed = store.claim(j.id, now, lease_until).await.unwrap();
        assert!(reclaimed.is_none());

        // After the lease lapses the job is claimable again
        let later = lease_until + chrono::Duration::seconds(1);
        let reclaimed = store
            .claim(j.id, later, later + chrono::Duration::seconds(60))
            .await
            .unwrap();
        assert!(reclaimed.is_some());
    }

    #[tokio::test]
    async fn test_due_retries_filters_by_time() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut due = job(DeliveryStatus::Retry, 3);
        due.next_attempt_at = Some(now - chrono::Duration::seconds(1));
        store.insert(&due).await.unwrap();

        let mut not_due = job(DeliveryStatus::Retry, 4);
        not_due.next_attempt_at = Some(now + chrono::Duration::seconds(600));
        store.insert(&not_due).await.unwrap();

        let fetched = store.due_retries(now, 10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, due.id);
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = InMemoryJobStore::new();
        store.insert(&job(DeliveryStatus::Delivered, 5)).await.unwrap();
        store.insert(&job(DeliveryStatus::Sent, 6)).await.unwrap();
        store.insert(&job(DeliveryStatus::Expired, 7)).await.unwrap();
        store.insert(&job(DeliveryStatus::Retry, 8)).await.unwrap();

        let stats = store
            .statistics(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.by_platform.get("google"), Some(&4));
    }
}
