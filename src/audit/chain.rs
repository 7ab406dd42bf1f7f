//! Append-only hash chain primitive.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::crypto::{chain_entry_hash, genesis_prev_hash, Hash256};
use crate::infra::{ChainRecord, ChainStore, Result};

/// Outcome of a chain verification walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub ok: bool,
    /// The smallest sequence whose stored state does not match its
    /// recomputed hash or linkage. Verification stops here; trust in
    /// downstream hashes is void once one link fails.
    pub first_corrupt_sequence: Option<u64>,
    pub entries_checked: u64,
}

impl VerificationResult {
    fn intact(entries_checked: u64) -> Self {
        Self {
            ok: true,
            first_corrupt_sequence: None,
            entries_checked,
        }
    }

    fn corrupt_at(sequence: u64, entries_checked: u64) -> Self {
        Self {
            ok: false,
            first_corrupt_sequence: Some(sequence),
            entries_checked,
        }
    }
}

/// Append-only, order-preserving storage of opaque records with
/// cryptographic linkage.
///
/// The chain head (`prev_hash` of the next append) is the one piece of
/// mutable shared state in the subsystem; it is protected by a per-chain
/// async mutex held only across the head read, hash computation, and the
/// durable append. Unserialized parallel writers would race on the head and
/// silently fork the chain.
pub struct HashChainStore {
    store: Arc<dyn ChainStore>,
    writers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HashChainStore {
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self {
            store,
            writers: Mutex::new(HashMap::new()),
        }
    }

    async fn writer_lock(&self, chain_id: &str) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().await;
        writers
            .entry(chain_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append a record whose payload may depend on its assigned position.
    ///
    /// `build` receives the sequence number and predecessor hash under the
    /// chain's writer lock and must return the canonical payload bytes as a
    /// string. It must be fast and purely local: no I/O belongs under this
    /// lock.
    pub async fn append_with<F>(&self, chain_id: &str, build: F) -> Result<ChainRecord>
    where
        F: FnOnce(u64, &Hash256) -> Result<String>,
    {
        let lock = self.writer_lock(chain_id).await;
        let _guard = lock.lock().await;

        let (sequence, prev_hash) = match self.store.head(chain_id).await? {
            Some((head_sequence, head_hash)) => (head_sequence + 1, head_hash),
            None => (1, genesis_prev_hash()),
        };

        let payload = build(sequence, &prev_hash)?;
        let entry_hash = chain_entry_hash(&prev_hash, payload.as_bytes());

        let record = ChainRecord {
            sequence,
            prev_hash,
            entry_hash,
            payload,
            appended_at: Utc::now(),
        };
        self.store.append(chain_id, record.clone()).await?;

        tracing::debug!(
            chain_id = chain_id,
            sequence = sequence,
            entry_hash = %hex::encode(entry_hash),
            "Chain record appended"
        );

        Ok(record)
    }

    /// Append opaque payload bytes, returning `(entry_hash, sequence)`.
    pub async fn append(&self, chain_id: &str, payload: String) -> Result<(Hash256, u64)> {
        let record = self.append_with(chain_id, |_, _| Ok(payload)).await?;
        Ok((record.entry_hash, record.sequence))
    }

    /// Current head `(sequence, entry_hash)`, or `None` for an empty chain.
    pub async fn head(&self, chain_id: &str) -> Result<Option<(u64, Hash256)>> {
        self.store.head(chain_id).await
    }

    /// Read records with `from <= sequence <= to`, ascending.
    pub async fn read_range(&self, chain_id: &str, from: u64, to: u64) -> Result<Vec<ChainRecord>> {
        self.store.read_range(chain_id, from, to).await
    }

    /// Read up to `limit` records after `cursor`, ascending.
    pub async fn read_after(
        &self,
        chain_id: &str,
        cursor: u64,
        limit: u32,
    ) -> Result<Vec<ChainRecord>> {
        self.store.read_after(chain_id, cursor, limit).await
    }

    /// Recompute hashes across `[from, to]` and compare against stored
    /// state. Any mismatch reports the first offending sequence and stops.
    pub async fn verify_range(
        &self,
        chain_id: &str,
        from: u64,
        to: u64,
    ) -> Result<VerificationResult> {
        if from == 0 || to < from {
            return Ok(VerificationResult::intact(0));
        }

        // Seed the expected predecessor hash: genesis for the chain start,
        // otherwise the stored hash of the entry just before the range.
        let mut expected_prev = if from == 1 {
            genesis_prev_hash()
        } else {
            match self
                .store
                .read_range(chain_id, from - 1, from - 1)
                .await?
                .into_iter()
                .next()
            {
                Some(prior) => prior.entry_hash,
                None => return Ok(VerificationResult::corrupt_at(from - 1, 0)),
            }
        };

        let records = self.store.read_range(chain_id, from, to).await?;
        let mut expected_sequence = from;
        let mut checked = 0u64;

        for record in &records {
            // A hole (removed entry) surfaces as the missing sequence
            if record.sequence != expected_sequence {
                return Ok(VerificationResult::corrupt_at(expected_sequence, checked));
            }
            if record.prev_hash != expected_prev {
                return Ok(VerificationResult::corrupt_at(record.sequence, checked));
            }

            let recomputed = chain_entry_hash(&record.prev_hash, record.payload.as_bytes());
            if recomputed != record.entry_hash {
                return Ok(VerificationResult::corrupt_at(record.sequence, checked));
            }

            expected_prev = record.entry_hash;
            expected_sequence += 1;
            checked += 1;
        }

        // A hole at the end of the requested range is corruption too,
        // unless the chain simply ends there.
        if expected_sequence <= to {
            if let Some((head_sequence, _)) = self.store.head(chain_id).await? {
                if head_sequence >= expected_sequence {
                    return Ok(VerificationResult::corrupt_at(expected_sequence, checked));
                }
            }
        }

        Ok(VerificationResult::intact(checked))
    }

    /// Verify the full chain.
    pub async fn verify_all(&self, chain_id: &str) -> Result<VerificationResult> {
        match self.store.head(chain_id).await? {
            Some((head_sequence, _)) => self.verify_range(chain_id, 1, head_sequence).await,
            None => Ok(VerificationResult::intact(0)),
        }
    }
}
