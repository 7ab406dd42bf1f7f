//! Deterministic hashing with domain separation
//!
//! All hashes in the trust subsystem are SHA-256 over domain-prefixed
//! preimages so that a chain-entry hash can never collide with an
//! idempotency key or a webhook signature computed over the same bytes.
//! JSON payloads are canonicalized per RFC 8785 (JCS) before hashing:
//! - Deterministic key ordering (lexicographic UTF-8)
//! - ES6-compatible number serialization
//! - Reproducible hashes across implementations

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// 32-byte SHA-256 hash
pub type Hash256 = [u8; 32];

// ============================================================================
// Domain Separation Constants
// ============================================================================

/// Domain prefix for audit chain entry hashing
pub const DOMAIN_CHAIN_ENTRY: &[u8] = b"LEGACY_CHAIN_ENTRY_V1";

/// Domain prefix for the chain genesis sentinel
pub const DOMAIN_CHAIN_GENESIS: &[u8] = b"LEGACY_CHAIN_GENESIS_V1";

/// Domain prefix for delivery idempotency keys
pub const DOMAIN_IDEMPOTENCY: &[u8] = b"LEGACY_DELIVERY_IDEM_V1";

/// Domain prefix for rendered notification payload hashing
pub const DOMAIN_RENDERED_PAYLOAD: &[u8] = b"LEGACY_RENDERED_PAYLOAD_V1";

// ============================================================================
// Binary Encoding Helpers
// ============================================================================

/// Encode a u64 as 8 bytes big-endian
#[inline]
pub fn u64_be(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Encode a string as length-prefixed UTF-8 bytes
/// Format: U32_BE(len) || UTF8_bytes
pub fn encode_string(s: &str) -> Vec<u8> {
    let utf8_bytes = s.as_bytes();
    let mut result = Vec::with_capacity(4 + utf8_bytes.len());
    result.extend_from_slice(&(utf8_bytes.len() as u32).to_be_bytes());
    result.extend_from_slice(utf8_bytes);
    result
}

// ============================================================================
// Canonical JSON (RFC 8785 JCS)
// ============================================================================

/// Convert a JSON value to its canonical string representation per RFC 8785.
///
/// # Panics
///
/// Panics if the JSON value contains a float that cannot be represented
/// (NaN or Infinity). Per RFC 8785, these are not valid JSON.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    serde_json_canonicalizer::to_string(value)
        .expect("Failed to canonicalize JSON - contains invalid values (NaN or Infinity)")
}

/// Hash raw bytes with SHA-256 (no domain prefix)
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash of canonical JSON (no domain prefix)
pub fn canonical_json_hash(value: &serde_json::Value) -> Hash256 {
    let canonical = canonicalize_json(value);
    sha256(canonical.as_bytes())
}

// ============================================================================
// Chain Link Hashing
// ============================================================================

/// The fixed sentinel used as `prev_hash` for the first entry of every chain.
///
/// PREV_0 = SHA256(b"LEGACY_CHAIN_GENESIS_V1")
pub fn genesis_prev_hash() -> Hash256 {
    static GENESIS: std::sync::OnceLock<Hash256> = std::sync::OnceLock::new();
    *GENESIS.get_or_init(|| {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_CHAIN_GENESIS);
        hasher.finalize().into()
    })
}

/// Compute the link hash for a chain entry.
///
/// ```text
/// entry_hash = SHA256(b"LEGACY_CHAIN_ENTRY_V1" || prev_hash(32) || payload_bytes)
/// ```
///
/// `payload_bytes` must be the canonical serialization of the entry; the
/// caller is responsible for canonicalization so that verification can
/// recompute the exact preimage from stored fields.
pub fn chain_entry_hash(prev_hash: &Hash256, payload_bytes: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_CHAIN_ENTRY);
    hasher.update(prev_hash);
    hasher.update(payload_bytes);
    hasher.finalize().into()
}

// ============================================================================
// Delivery Idempotency Keys
// ============================================================================

/// Compute the idempotency key for a logical notification.
///
/// ```text
/// idem_preimage =
///   b"LEGACY_DELIVERY_IDEM_V1" ||
///   UUID(policy_id) ||
///   ENC_STR(platform) ||
///   ENC_STR(method) ||
///   rendered_payload_hash(32)
///
/// idempotency_key = SHA256(idem_preimage)
/// ```
///
/// Because rendering is deterministic, resubmitting the same logical
/// notification converges to the same key and is deduplicated rather than
/// double-delivered.
pub fn compute_idempotency_key(
    policy_id: &Uuid,
    platform: &str,
    method: &str,
    rendered_payload_hash: &Hash256,
) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_IDEMPOTENCY);
    hasher.update(policy_id.as_bytes());
    hasher.update(encode_string(platform));
    hasher.update(encode_string(method));
    hasher.update(rendered_payload_hash);
    hasher.finalize().into()
}

/// Hash a rendered notification payload with a domain prefix.
pub fn rendered_payload_hash(canonical_payload: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RENDERED_PAYLOAD);
    hasher.update(canonical_payload);
    hasher.finalize().into()
}

// ============================================================================
// Webhook Signatures
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Compute the `X-Webhook-Signature` value for an outgoing webhook body.
///
/// Format: `sha256=<hex(HMAC-SHA256(secret, body))>`
pub fn webhook_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// ============================================================================
// Tests
// ============================================================================
