//! Audit entries and the draft builder collaborators use to append them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{canonicalize_json, Hash256};

use super::{hash256_hex, DeathVerification, EntryStatus, EventType, PolicyInterpretation, SubjectId};

/// A single immutable entry in a subject's audit chain.
///
/// Entries are created exactly once by [`crate::audit::AuditLog::append`],
/// never mutated, never deleted. `entry_hash` commits to `prev_hash` and the
/// canonical serialization of every other field, so any out-of-band change
/// to a stored entry breaks verification from that sequence onward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier
    pub entry_id: Uuid,

    /// Position in the subject's chain, monotonically assigned from 1
    pub sequence: u64,

    /// Subject whose chain this entry belongs to
    pub subject_id: SubjectId,

    /// Event classification
    pub event_type: EventType,

    /// Human-readable description of the event
    pub description: String,

    /// Optional AI service tag (no semantic meaning to this core)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_service_used: Option<String>,

    /// Opaque input payload, stored verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_data: Option<serde_json::Value>,

    /// Opaque output payload, stored verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,

    /// Outcome of the recorded operation
    pub status: EntryStatus,

    /// Wall-clock time the entry was appended
    pub recorded_at: DateTime<Utc>,

    /// Link hash of the preceding entry (genesis sentinel for sequence 1)
    #[serde(with = "hash256_hex")]
    pub prev_hash: Hash256,

    /// SHA-256 over `prev_hash` and the canonical entry payload
    #[serde(with = "hash256_hex")]
    pub entry_hash: Hash256,
}

impl AuditEntry {
    /// Canonical serialization of every field covered by `entry_hash`.
    ///
    /// Timestamps are rendered as RFC 3339 with microsecond precision so the
    /// preimage is reproducible from stored fields during verification.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = serde_json::json!({
            "entry_id": self.entry_id.to_string(),
            "sequence": self.sequence,
            "subject_id": self.subject_id.to_string(),
            "event_type": self.event_type.as_str(),
            "description": self.description,
            "ai_service_used": self.ai_service_used,
            "input_data": self.input_data,
            "output_data": self.output_data,
            "status": self.status.as_str(),
            "recorded_at": self.recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        });
        canonicalize_json(&value).into_bytes()
    }
}

/// Builder for audit entries; the log fills in sequence, hashes, and time.
#[derive(Debug, Clone)]
pub struct AuditEntryDraft {
    pub subject_id: SubjectId,
    pub event_type: EventType,
    pub description: String,
    pub ai_service_used: Option<String>,
    pub input_data: Option<serde_json::Value>,
    pub output_data: Option<serde_json::Value>,
    pub status: EntryStatus,
}

impl AuditEntryDraft {
    pub fn new(
        subject_id: SubjectId,
        event_type: impl Into<EventType>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            subject_id,
            event_type: event_type.into(),
            description: description.into(),
            ai_service_used: None,
            input_data: None,
            output_data: None,
            status: EntryStatus::Success,
        }
    }

    /// Tag the AI service involved in the recorded operation
    pub fn ai_service(mut self, service: impl Into<String>) -> Self {
        self.ai_service_used = Some(service.into());
        self
    }

    /// Attach the operation's input payload
    pub fn input(mut self, data: serde_json::Value) -> Self {
        self.input_data = Some(data);
        self
    }

    /// Attach the operation's output payload
    pub fn output(mut self, data: serde_json::Value) -> Self {
        self.output_data = Some(data);
        self
    }

    /// Override the default `success` status
    pub fn status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    /// Entry for a verified death certificate, from the upstream
    /// verification collaborator's output.
    pub fn death_verified(verification: &DeathVerification) -> Self {
        Self::new(
            verification.subject_id,
            EventType::DEATH_VERIFIED,
            format!(
                "Death of {} verified against certificate {}",
                verification.full_name, verification.certificate_id
            ),
        )
        .ai_service("azure_vision")
        .output(serde_json::json!({
            "full_name": verification.full_name,
            "date_of_death": verification.date_of_death,
            "certificate_id": verification.certificate_id,
            "confidence": verification.confidence,
        }))
    }

    /// Entry for an asset placed under freeze after death verification.
    pub fn asset_frozen(subject_id: SubjectId, asset_name: &str) -> Self {
        Self::new(
            subject_id,
            EventType::ASSET_FROZEN,
            format!("Asset frozen: {}", asset_name),
        )
        .input(serde_json::json!({ "asset_name": asset_name }))
    }

    /// Entry for an interpreted action policy, from the upstream policy
    /// interpretation collaborator's output.
    pub fn policy_interpreted(subject_id: SubjectId, interpretation: &PolicyInterpretation) -> Self {
        Self::new(
            subject_id,
            EventType::POLICY_INTERPRETED,
            format!(
                "Policy {} interpreted: {} on {}",
                interpretation.policy_id, interpretation.action_type, interpretation.platform
            ),
        )
        .ai_service("azure_openai")
        .output(serde_json::json!({
            "policy_id": interpretation.policy_id.to_string(),
            "platform": interpretation.platform.as_str(),
            "action_type": interpretation.action_type.as_str(),
            "specific_instructions": interpretation.specific_instructions,
        }))
    }
}
