//! Typed event journal over the hash chain.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{HashChainStore, VerificationResult};
use crate::domain::{AuditEntry, AuditEntryDraft, EntryStatus, EventType, SubjectId};
use crate::infra::{ChainRecord, ChainStore, Result, TrustError};

/// Filters for audit trail queries.
#[derive(Debug, Default, Clone)]
pub struct AuditQueryFilters {
    pub event_type: Option<EventType>,
    pub status: Option<EntryStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One page of an audit trail query, restartable from `next_cursor`.
#[derive(Debug, Clone)]
pub struct AuditPage {
    /// Matching entries, ascending by sequence
    pub entries: Vec<AuditEntry>,
    /// Pass back as the cursor to continue; `None` when the chain is
    /// exhausted
    pub next_cursor: Option<u64>,
}

/// Chain-wide integrity summary for operator tooling.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub subject_id: SubjectId,
    pub total_entries: u64,
    pub verified_entries: u64,
    pub ok: bool,
    pub first_corrupt_sequence: Option<u64>,
}

/// Typed event journal. One chain per subject; the chain is exclusively
/// owned by this log, and callers hold no reference that permits mutation.
pub struct AuditLog {
    chain: HashChainStore,
}

impl AuditLog {
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self {
            chain: HashChainStore::new(store),
        }
    }

    fn chain_id(subject_id: SubjectId) -> String {
        subject_id.to_string()
    }

    /// Append an entry to the subject's chain.
    ///
    /// Fills the timestamp and sequence, serializes canonically, and
    /// delegates to the chain store. Never fails silently: a store failure
    /// propagates so the caller's triggering operation aborts rather than
    /// proceed un-audited.
    pub async fn append(&self, draft: AuditEntryDraft) -> Result<AuditEntry> {
        let chain_id = Self::chain_id(draft.subject_id);

        let mut built: Option<AuditEntry> = None;
        let append_result = self
            .chain
            .append_with(&chain_id, |sequence, prev_hash| {
                let entry = AuditEntry {
                    entry_id: Uuid::new_v4(),
                    sequence,
                    subject_id: draft.subject_id,
                    event_type: draft.event_type.clone(),
                    description: draft.description.clone(),
                    ai_service_used: draft.ai_service_used.clone(),
                    input_data: draft.input_data.clone(),
                    output_data: draft.output_data.clone(),
                    status: draft.status,
                    recorded_at: Utc::now(),
                    prev_hash: *prev_hash,
                    entry_hash: [0u8; 32],
                };
                let payload = String::from_utf8(entry.canonical_bytes())
                    .map_err(|e| TrustError::Internal(format!("non-utf8 canonical payload: {e}")))?;
                built = Some(entry);
                Ok(payload)
            })
            .await;

        let record = match append_result {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    subject_id = %draft.subject_id,
                    event_type = %draft.event_type,
                    error = %e,
                    "Audit append failed; triggering operation must abort"
                );
                return Err(e);
            }
        };

        let mut entry = built
            .ok_or_else(|| TrustError::Internal("audit entry not built during append".into()))?;
        entry.entry_hash = record.entry_hash;

        tracing::info!(
            subject_id = %entry.subject_id,
            sequence = entry.sequence,
            event_type = %entry.event_type,
            status = %entry.status,
            "Audit entry appended"
        );

        Ok(entry)
    }

    /// Walk the subject's full chain, recomputing every link.
    /// Operator tooling, not the hot path.
    pub async fn verify(&self, subject_id: SubjectId) -> Result<VerificationResult> {
        let result = self.chain.verify_all(&Self::chain_id(subject_id)).await?;
        if !result.ok {
            tracing::error!(
                subject_id = %subject_id,
                first_corrupt_sequence = ?result.first_corrupt_sequence,
                "Audit chain verification FAILED"
            );
        }
        Ok(result)
    }

    /// Verify the subject's chain and fail hard on corruption.
    ///
    /// For operational tooling that must not act on a trail whose
    /// integrity is in question. Corruption is surfaced, never
    /// auto-repaired.
    pub async fn ensure_intact(&self, subject_id: SubjectId) -> Result<()> {
        let result = self.verify(subject_id).await?;
        match result.first_corrupt_sequence {
            None => Ok(()),
            Some(sequence) => Err(TrustError::ChainCorruption {
                subject_id,
                sequence,
            }),
        }
    }

    /// Integrity summary for the subject's chain.
    pub async fn integrity_report(&self, subject_id: SubjectId) -> Result<IntegrityReport> {
        let chain_id = Self::chain_id(subject_id);
        let total_entries = self
            .chain
            .head(&chain_id)
            .await?
            .map(|(sequence, _)| sequence)
            .unwrap_or(0);
        let result = self.verify(subject_id).await?;

        Ok(IntegrityReport {
            subject_id,
            total_entries,
            verified_entries: result.entries_checked,
            ok: result.ok,
            first_corrupt_sequence: result.first_corrupt_sequence,
        })
    }

    /// Read one page of the subject's audit trail, ascending by sequence.
    ///
    /// `cursor` is the last sequence already consumed (0 to start). The
    /// page may contain fewer than `limit` entries when filters exclude
    /// records; `next_cursor` still advances past everything scanned.
    pub async fn query(
        &self,
        subject_id: SubjectId,
        filters: &AuditQueryFilters,
        cursor: u64,
        limit: u32,
    ) -> Result<AuditPage> {
        let chain_id = Self::chain_id(subject_id);
        let records = self.chain.read_after(&chain_id, cursor, limit).await?;

        let exhausted = (records.len() as u32) < limit;
        let next_cursor = if exhausted {
            None
        } else {
            records.last().map(|r| r.sequence)
        };

        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            let entry = entry_from_record(record)?;
            if Self::matches(&entry, filters) {
                entries.push(entry);
            }
        }

        Ok(AuditPage {
            entries,
            next_cursor,
        })
    }

    fn matches(entry: &AuditEntry, filters: &AuditQueryFilters) -> bool {
        if let Some(event_type) = &filters.event_type {
            if &entry.event_type != event_type {
                return false;
            }
        }
        if let Some(status) = filters.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(from) = filters.from {
            if entry.recorded_at < from {
                return false;
            }
        }
        if let Some(to) = filters.to {
            if entry.recorded_at > to {
                return false;
            }
        }
        true
    }
}

/// Canonical payload shape, mirroring `AuditEntry::canonical_bytes`.
#[derive(Deserialize)]
struct EntryPayload {
    entry_id: Uuid,
    sequence: u64,
    subject_id: Uuid,
    event_type: String,
    description: String,
    ai_service_used: Option<String>,
    input_data: Option<serde_json::Value>,
    output_data: Option<serde_json::Value>,
    status: String,
    recorded_at: String,
}

fn entry_from_record(record: &ChainRecord) -> Result<AuditEntry> {
    let payload: EntryPayload = serde_json::from_str(&record.payload)
        .map_err(|e| TrustError::Internal(format!("malformed entry payload: {e}")))?;

    let status = EntryStatus::parse(&payload.status)
        .ok_or_else(|| TrustError::Internal(format!("unknown entry status: {}", payload.status)))?;
    let recorded_at = DateTime::parse_from_rfc3339(&payload.recorded_at)
        .map_err(|e| TrustError::Internal(format!("invalid recorded_at: {e}")))?
        .with_timezone(&Utc);

    Ok(AuditEntry {
        entry_id: payload.entry_id,
        sequence: payload.sequence,
        subject_id: SubjectId::from_uuid(payload.subject_id),
        event_type: EventType::from(payload.event_type),
        description: payload.description,
        ai_service_used: payload.ai_service_used,
        input_data: payload.input_data,
        output_data: payload.output_data,
        status,
        recorded_at,
        prev_hash: record.prev_hash,
        entry_hash: record.entry_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::InMemoryChainStore;

    fn new_log() -> (AuditLog, Arc<InMemoryChainStore>) {
        let store = Arc::new(InMemoryChainStore::new());
        (AuditLog::new(store.clone()), store)
    }

    fn draft(subject_id: SubjectId, event_type: &str) -> AuditEntryDraft {
        AuditEntryDraft::new(subject_id, event_type, format!("{event_type} happened"))
    }

    #[tokio::test]
    async fn test_append_assigns_sequence_and_hashes() {
        let (log, _) = new_log();
        let subject = SubjectId::new();

        let e1 = log.append(draft(subject, EventType::DEATH_VERIFIED)).await.unwrap();
        let e2 = log.append(draft(subject, EventType::ASSET_FROZEN)).await.unwrap();

        assert_eq!(e1.sequence, 1);
        assert_eq!(e2.sequence, 2);
        assert_eq!(e2.prev_hash, e1.entry_hash);
        assert_ne!(e1.entry_hash, [0u8; 32]);
    }

    #[tokio::test]
    async fn test_chains_per_subject_are_independent() {
        let (log, _) = new_log();
        let alice = SubjectId::new();
        let bob = SubjectId::new();

        log.append(draft(alice, EventType::DEATH_VERIFIED)).await.unwrap();
        let bob_first = log.append(draft(bob, EventType::DEATH_VERIFIED)).await.unwrap();

        // Bob's chain starts at 1 regardless of Alice's appends
        assert_eq!(bob_first.sequence, 1);
        assert!(log.verify(alice).await.unwrap().ok);
        assert!(log.verify(bob).await.unwrap().ok);
    }

    #[tokio::test]
    async fn test_verify_detects_stored_mutation() {
        let (log, store) = new_log();
        let subject = SubjectId::new();

        for event in [
            EventType::DEATH_VERIFIED,
            EventType::ASSET_FROZEN,
            EventType::POLICY_INTERPRETED,
        ] {
            log.append(draft(subject, event)).await.unwrap();
        }

        store
            .tamper_with(&subject.to_string(), 2, |record| {
                record.payload = record.payload.replace("asset_frozen", "asset_thawed");
            })
            .await;

        let result = log.verify(subject).await.unwrap();
        assert!(!result.ok);
        assert_eq!(result.first_corrupt_sequence, Some(2));
    }

    #[tokio::test]
    async fn test_query_roundtrips_entries() {
        let (log, _) = new_log();
        let subject = SubjectId::new();

        let appended = log
            .append(
                draft(subject, EventType::NOTIFICATION_QUEUED)
                    .input(serde_json::json!({"platform": "google"}))
                    .status(EntryStatus::Pending),
            )
            .await
            .unwrap();

        let page = log
            .query(subject, &AuditQueryFilters::default(), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert!(page.next_cursor.is_none());

        let loaded = &page.entries[0];
        assert_eq!(loaded.entry_id, appended.entry_id);
        assert_eq!(loaded.event_type.as_str(), EventType::NOTIFICATION_QUEUED);
        assert_eq!(loaded.status, EntryStatus::Pending);
        assert_eq!(
            loaded.input_data,
            Some(serde_json::json!({"platform": "google"}))
        );
        assert_eq!(loaded.entry_hash, appended.entry_hash);
    }

    #[tokio::test]
    async fn test_query_filters_and_cursor() {
        let (log, _) = new_log();
        let subject = SubjectId::new();

        for i in 0..6 {
            let event = if i % 2 == 0 {
                EventType::NOTIFICATION_SENT
            } else {
                EventType::NOTIFICATION_FAILED
            };
            log.append(draft(subject, event)).await.unwrap();
        }

        let filters = AuditQueryFilters {
            event_type: Some(EventType::from(EventType::NOTIFICATION_FAILED)),
            ..Default::default()
        };

        let first_page = log.query(subject, &filters, 0, 4).await.unwrap();
        assert_eq!(first_page.entries.len(), 2);
        assert_eq!(first_page.next_cursor, Some(4));

        let second_page = log.query(subject, &filters, 4, 4).await.unwrap();
        assert_eq!(second_page.entries.len(), 1);
        assert!(second_page.next_cursor.is_none());

        let sequences: Vec<u64> = first_page
            .entries
            .iter()
            .chain(second_page.entries.iter())
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_ensure_intact_raises_on_corruption() {
        let (log, store) = new_log();
        let subject = SubjectId::new();

        log.append(draft(subject, EventType::DEATH_VERIFIED)).await.unwrap();
        log.ensure_intact(subject).await.unwrap();

        store
            .tamper_with(&subject.to_string(), 1, |record| {
                record.payload.push(' ');
            })
            .await;

        let err = log.ensure_intact(subject).await.unwrap_err();
        assert!(matches!(
            err,
            crate::infra::TrustError::ChainCorruption { sequence: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_integrity_report() {
        let (log, store) = new_log();
        let subject = SubjectId::new();

        for _ in 0..4 {
            log.append(draft(subject, EventType::ASSET_FROZEN)).await.unwrap();
        }

        let report = log.integrity_report(subject).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.total_entries, 4);
        assert_eq!(report.verified_entries, 4);

        store
            .tamper_with(&subject.to_string(), 1, |record| {
                record.entry_hash[31] ^= 1;
            })
            .await;

        let report = log.integrity_report(subject).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.first_corrupt_sequence, Some(1));
    }
}
