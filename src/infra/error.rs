//! Error types for the trust and delivery subsystem.

use thiserror::Error;

use crate::domain::{DeliveryMethod, DeliveryStatus, JobId, SubjectId};

/// Errors surfaced to callers of the audit log, template registry, and
/// delivery engine.
///
/// Transport-level failures are deliberately absent: they are contained
/// inside the delivery engine's retry loop and only ever reach a caller as
/// job state (`retry`/`expired`), never as an error from `submit`.
#[derive(Error, Debug)]
pub enum TrustError {
    /// The backing store could not durably commit. Fatal to the triggering
    /// operation; an unaudited state change is worse than a rejected request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Chain verification found a hash mismatch. Surfaced to an operator,
    /// never auto-repaired.
    #[error("chain corruption for subject {subject_id} at sequence {sequence}")]
    ChainCorruption { subject_id: SubjectId, sequence: u64 },

    /// The chain head moved underneath an append (single-writer violation
    /// or concurrent external writer).
    #[error("chain conflict for {chain_id} at sequence {sequence}")]
    ChainConflict { chain_id: String, sequence: u64 },

    #[error("delivery job not found: {0}")]
    JobNotFound(JobId),

    #[error("no template for {platform}/{action_type} ({template_type})")]
    TemplateNotFound {
        platform: String,
        action_type: String,
        template_type: String,
    },

    /// Template failed registration validation.
    #[error("invalid template: {}", reasons.join("; "))]
    InvalidTemplate { reasons: Vec<String> },

    /// Rendering context did not satisfy the template's required fields.
    /// All absent fields are reported, not just the first.
    #[error("missing required fields: {}", fields.join(", "))]
    MissingRequiredFields { fields: Vec<String> },

    /// A state transition the job state machine does not permit.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    /// No transport is registered for the job's delivery method.
    #[error("no transport registered for method: {0}")]
    TransportUnavailable(DeliveryMethod),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for trust subsystem operations
pub type Result<T> = std::result::Result<T, TrustError>;
