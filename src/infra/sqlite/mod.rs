//! SQLite-backed stores for chain entries and delivery jobs.
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microsecond
//! precision, `Z` suffix) so that SQL string comparison is chronological.

mod chain_store;
mod job_store;

pub use chain_store::SqliteChainStore;
pub use job_store::SqliteJobStore;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{Result, TrustError};

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TrustError::Internal(format!("invalid timestamp {s:?}: {e}")))
}

pub(crate) fn parse_hash(s: &str) -> Result<[u8; 32]> {
    let bytes =
        hex::decode(s).map_err(|e| TrustError::Internal(format!("invalid hash {s:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| TrustError::Internal(format!("hash {s:?} is not 32 bytes")))
}
