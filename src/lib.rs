//! Legacy Trust Library
//!
//! Trust and delivery subsystem for digital-legacy management: a
//! tamper-evident, hash-chained audit log that every component writes to,
//! and a notification delivery engine that dispatches platform-bound
//! requests with retry, backoff, idempotency, and status tracking.
//!
//! ## Modules
//!
//! - [`crypto`] - Domain-separated hashing and canonical JSON
//! - [`domain`] - Core types (audit entries, delivery jobs, contracts)
//! - [`infra`] - Errors, storage traits, SQLite and in-memory stores
//! - [`audit`] - Hash chain primitive and the typed audit log
//! - [`template`] - Notification template registry and rendering
//! - [`delivery`] - Delivery engine, transports, sweeper, worker pool
//! - [`config`] - Environment-driven engine configuration
//! - [`telemetry`] - Structured logging setup

pub mod audit;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod domain;
pub mod infra;
pub mod telemetry;
pub mod template;

// Re-export commonly used types
pub use audit::{AuditLog, AuditPage, AuditQueryFilters, HashChainStore, VerificationResult};
pub use config::EngineConfig;
pub use delivery::{DeliveryEngine, RetrySweeper, SubmitRequest, TransportRegistry, WorkerPool};
pub use domain::{
    ActionType, AuditEntry, AuditEntryDraft, DeliveryJob, DeliveryMethod, DeliveryStatus,
    EntryStatus, EventType, Hash256, JobId, Platform, PolicyId, SubjectId,
};
pub use infra::{Result, TrustError};
pub use template::{Template, TemplateRegistry};
