//! Cryptographic utilities: domain-separated SHA-256 hashing and canonical
//! JSON encoding for the audit chain and delivery idempotency keys.

pub mod hash;

pub use hash::{
    canonical_json_hash, canonicalize_json, chain_entry_hash, compute_idempotency_key,
    genesis_prev_hash, sha256, webhook_signature, Hash256,
};
