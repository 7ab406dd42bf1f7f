//! Delivery jobs and their status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::crypto::Hash256;

use super::{hash256_hex, ActionType, DeliveryMethod, JobId, Platform, PolicyId, SubjectId};

/// Delivery job status.
///
/// ```text
/// pending → {sent | delivered | failed}
/// failed  → {retry | expired}
/// retry   → pending
/// sent    → {delivered | failed}   (missing ack before timeout = failed)
/// ```
///
/// `delivered` and `expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Retry,
    Expired,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Retry => "retry",
            DeliveryStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            "retry" => Some(DeliveryStatus::Retry),
            "expired" => Some(DeliveryStatus::Expired),
            _ => None,
        }
    }

    /// Terminal states admit no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Expired)
    }

    /// Whether the state machine permits `self → to`.
    pub fn can_transition_to(&self, to: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, to),
            (Pending, Sent)
                | (Pending, Delivered)
                | (Pending, Failed)
                | (Failed, Retry)
                | (Failed, Expired)
                | (Retry, Pending)
                | (Sent, Delivered)
                | (Sent, Failed)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A platform-bound notification attempt tracked through the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: JobId,

    /// Policy this job was created from (1 policy → N platform jobs)
    pub policy_id: PolicyId,

    /// Subject whose audit chain records this job's lifecycle
    pub subject_id: SubjectId,

    pub platform: Platform,
    pub action_type: ActionType,
    pub method: DeliveryMethod,

    /// Rendered notification payload (canonical JSON text)
    pub rendered_payload: String,

    /// Deterministic fingerprint of the logical notification
    #[serde(with = "hash256_hex")]
    pub idempotency_key: Hash256,

    pub status: DeliveryStatus,

    /// Completed transport attempts
    pub attempt_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// When a `retry` job becomes due again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Worker lease; a job is claimable only when unset or lapsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    /// Whether a worker may claim this job at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending
            && self.lease_expires_at.map_or(true, |lease| lease <= now)
    }
}

/// Aggregate delivery outcomes over a query window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryStatistics {
    pub total: u64,
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub expired: u64,
    pub pending: u64,
    pub by_platform: HashMap<String, u64>,
    pub by_method: HashMap<String, u64>,
    /// (sent + delivered) / total; 0.0 when no jobs fall in the window
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Expired.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Sent.is_terminal());
        assert!(!DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Retry.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        use DeliveryStatus::*;
        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Retry));
        assert!(Failed.can_transition_to(Expired));
        assert!(Retry.can_transition_to(Pending));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        use DeliveryStatus::*;
        // No transitions out of terminal states
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Expired.can_transition_to(Pending));
        assert!(!Expired.can_transition_to(Retry));
        // No skipping the failure path
        assert!(!Pending.can_transition_to(Retry));
        assert!(!Pending.can_transition_to(Expired));
        assert!(!Retry.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Expired));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Failed,
            DeliveryStatus::Retry,
            DeliveryStatus::Expired,
        ] {
            assert_eq!(DeliveryStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DeliveryStatus::parse("queued"), None);
    }

    #[test]
    fn test_claimable() {
        let now = Utc::now();
        let mut job = DeliveryJob {
            id: JobId::new(),
            policy_id: PolicyId::new(),
            subject_id: SubjectId::new(),
            platform: Platform::google(),
            action_type: ActionType::Delete,
            method: DeliveryMethod::Email,
            rendered_payload: "{}".to_string(),
            idempotency_key: [0u8; 32],
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        };

        assert!(job.is_claimable(now));

        job.lease_expires_at = Some(now + chrono::Duration::seconds(30));
        assert!(!job.is_claimable(now));

        // Lapsed lease releases the job
        assert!(job.is_claimable(now + chrono::Duration::seconds(31)));

        job.status = DeliveryStatus::Retry;
        job.lease_expires_at = None;
        assert!(!job.is_claimable(now));
    }
}
