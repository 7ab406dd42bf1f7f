//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for any valid input:
//! canonical hashing stability, idempotency-key sensitivity, chain
//! integrity under arbitrary append sequences, and render determinism.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use legacy_trust::audit::HashChainStore;
use legacy_trust::crypto::{
    canonical_json_hash, canonicalize_json, chain_entry_hash, compute_idempotency_key,
};
use legacy_trust::domain::{ActionType, DeliveryMethod, Platform};
use legacy_trust::infra::InMemoryChainStore;
use legacy_trust::template::TemplateRegistry;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

// ============================================================================
// Custom Strategies
// ============================================================================

/// Generate a random UUID
fn arb_uuid() -> impl Strategy<Value = uuid::Uuid> {
    any::<[u8; 16]>().prop_map(uuid::Uuid::from_bytes)
}

/// Generate a random JSON payload
fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!({})),
        (any::<i64>(), "[a-zA-Z0-9 ]{0,20}")
            .prop_map(|(num, s)| serde_json::json!({ "number": num, "string": s })),
        any::<i64>().prop_map(|n| serde_json::json!({
            "outer": { "inner": { "value": n } }
        })),
        prop::collection::vec(any::<i32>(), 0..8)
            .prop_map(|v| serde_json::json!({ "items": v })),
    ]
}

/// Generate ASCII chain payloads (safe to tamper bytewise)
fn arb_chain_payloads() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,40}", 1..12)
}

/// Non-empty printable context value
fn arb_context_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 .@-]{0,29}"
}

// ============================================================================
// Hashing Properties
// ============================================================================

proptest! {
    #[test]
    fn canonical_hash_is_deterministic(payload in arb_payload()) {
        prop_assert_eq!(canonical_json_hash(&payload), canonical_json_hash(&payload));
    }

    #[test]
    fn canonicalization_is_stable(payload in arb_payload()) {
        let once = canonicalize_json(&payload);
        let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
        prop_assert_eq!(canonicalize_json(&reparsed), once);
    }

    #[test]
    fn entry_hash_binds_prev_and_payload(
        payload in "[a-z0-9]{1,60}",
        prev_a in any::<[u8; 32]>(),
        prev_b in any::<[u8; 32]>(),
    ) {
        let hash_a = chain_entry_hash(&prev_a, payload.as_bytes());
        prop_assert_eq!(hash_a, chain_entry_hash(&prev_a, payload.as_bytes()));
        if prev_a != prev_b {
            prop_assert_ne!(hash_a, chain_entry_hash(&prev_b, payload.as_bytes()));
        }
    }

    #[test]
    fn idempotency_key_sensitive_to_each_component(
        policy in arb_uuid(),
        platform in "[a-z]{3,12}",
        payload_hash in any::<[u8; 32]>(),
    ) {
        let base = compute_idempotency_key(&policy, &platform, "email", &payload_hash);
        prop_assert_eq!(
            base,
            compute_idempotency_key(&policy, &platform, "email", &payload_hash)
        );
        prop_assert_ne!(
            base,
            compute_idempotency_key(&policy, &platform, "webhook", &payload_hash)
        );

        let mut other_hash = payload_hash;
        other_hash[0] ^= 0x01;
        prop_assert_ne!(
            base,
            compute_idempotency_key(&policy, &platform, "email", &other_hash)
        );
    }
}

// ============================================================================
// Chain Integrity Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any sequence of appends verifies clean end to end.
    #[test]
    fn appended_chains_always_verify(payloads in arb_chain_payloads()) {
        let rt = runtime();
        rt.block_on(async {
            let chain = HashChainStore::new(Arc::new(InMemoryChainStore::new()));
            for payload in &payloads {
                chain.append("c", payload.clone()).await.unwrap();
            }
            let result = chain.verify_all("c").await.unwrap();
            assert!(result.ok);
            assert_eq!(result.entries_checked, payloads.len() as u64);
        });
    }

    /// Mutating any single stored payload reports exactly that sequence.
    #[test]
    fn tampering_any_entry_reports_smallest_affected_sequence(
        payloads in arb_chain_payloads(),
        victim_index in any::<prop::sample::Index>(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = Arc::new(InMemoryChainStore::new());
            let chain = HashChainStore::new(store.clone());
            for payload in &payloads {
                chain.append("c", payload.clone()).await.unwrap();
            }

            let victim = victim_index.index(payloads.len()) as u64 + 1;
            store
                .tamper_with("c", victim, |record| {
                    let mut bytes = record.payload.clone().into_bytes();
                    bytes[0] = if bytes[0] == b'z' { b'a' } else { b'z' };
                    record.payload = String::from_utf8(bytes).unwrap();
                })
                .await;

            let result = chain.verify_all("c").await.unwrap();
            assert!(!result.ok);
            assert_eq!(result.first_corrupt_sequence, Some(victim));
        });
    }
}

// ============================================================================
// Render Determinism Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Identical (platform, action, method, context) renders byte-identical
    /// payloads and identical idempotency keys.
    #[test]
    fn render_is_deterministic(
        full_name in arb_context_value(),
        date_of_death in arb_context_value(),
        account in arb_context_value(),
        policy in arb_uuid(),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let registry = TemplateRegistry::new();
            let context: BTreeMap<String, String> = [
                ("full_name".to_string(), full_name.clone()),
                ("date_of_death".to_string(), date_of_death.clone()),
                ("account_identifier".to_string(), account.clone()),
            ]
            .into_iter()
            .collect();

            let first = registry
                .render(&Platform::google(), ActionType::Delete, DeliveryMethod::Email, &context)
                .await
                .unwrap();
            let second = registry
                .render(&Platform::google(), ActionType::Delete, DeliveryMethod::Email, &context)
                .await
                .unwrap();

            assert_eq!(first.canonical, second.canonical);
            assert_eq!(first.payload_hash, second.payload_hash);

            let key_a = compute_idempotency_key(&policy, "google", "email", &first.payload_hash);
            let key_b = compute_idempotency_key(&policy, "google", "email", &second.payload_hash);
            assert_eq!(key_a, key_b);
        });
    }
}
