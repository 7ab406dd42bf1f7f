//! Tamper-evident audit logging.
//!
//! [`HashChainStore`] is the append-only ledger primitive: it owns the
//! single-writer discipline per chain and the link-hash computation.
//! [`AuditLog`] is the typed journal on top of it that every other
//! component writes through.

mod chain;
mod log;

pub use chain::{HashChainStore, VerificationResult};
pub use log::{AuditLog, AuditPage, AuditQueryFilters, IntegrityReport};
