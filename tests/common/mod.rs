//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use legacy_trust::audit::AuditLog;
use legacy_trust::config::EngineConfig;
use legacy_trust::delivery::transport::{
    DispatchEnvelope, DispatchOutcome, Transport, TransportError,
};
use legacy_trust::delivery::{BackoffPolicy, DeliveryEngine, TransportRegistry};
use legacy_trust::domain::{ActionType, DeliveryMethod, Platform, PolicyId, SubjectId};
use legacy_trust::infra::{InMemoryChainStore, InMemoryJobStore};
use legacy_trust::template::TemplateRegistry;
use legacy_trust::SubmitRequest;

/// Rendering context satisfying the built-in templates' required fields.
pub fn full_context() -> BTreeMap<String, String> {
    [
        ("full_name", "John Doe"),
        ("date_of_death", "2024-01-15"),
        ("account_identifier", "****1234"),
        ("contact_name", "Jane Doe"),
        ("contact_email", "jane@example.com"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn submit_request(
    policy_id: PolicyId,
    subject_id: SubjectId,
    platform: &str,
    action_type: ActionType,
    method: DeliveryMethod,
) -> SubmitRequest {
    SubmitRequest {
        policy_id,
        subject_id,
        platform: Platform::new(platform),
        action_type,
        method,
        context: full_context(),
    }
}

/// Transport that fails a configured number of times before succeeding.
pub struct FlakyTransport {
    method: DeliveryMethod,
    failures_remaining: AtomicU32,
    outcome: DispatchOutcome,
    pub dispatches: AtomicU32,
}

impl FlakyTransport {
    pub fn new(method: DeliveryMethod, failures: u32, outcome: DispatchOutcome) -> Self {
        Self {
            method,
            failures_remaining: AtomicU32::new(failures),
            outcome,
            dispatches: AtomicU32::new(0),
        }
    }

    pub fn always_failing(method: DeliveryMethod) -> Self {
        Self::new(method, u32::MAX, DispatchOutcome::Sent)
    }

    pub fn dispatch_count(&self) -> u32 {
        self.dispatches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    fn method(&self) -> DeliveryMethod {
        self.method
    }

    async fn dispatch(
        &self,
        _envelope: &DispatchEnvelope,
    ) -> std::result::Result<DispatchOutcome, TransportError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(TransportError::HttpStatus(503));
        }
        Ok(self.outcome)
    }
}

/// Engine config tuned for fast test turnaround: no jitter, millisecond
/// backoff, short acknowledgment window.
pub fn fast_config(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        max_attempts,
        backoff: BackoffPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(200),
            2.0,
            0.0,
        ),
        transport_timeout: Duration::from_secs(5),
        ack_timeout: Duration::from_millis(100),
        lease_timeout: Duration::from_secs(60),
        sweep_interval: Duration::from_millis(10),
        sweep_batch: 100,
        worker_count: 2,
    }
}

/// Fully wired in-memory engine fixture.
pub struct EngineFixture {
    pub engine: Arc<DeliveryEngine>,
    pub audit: Arc<AuditLog>,
    pub jobs: Arc<InMemoryJobStore>,
    pub chains: Arc<InMemoryChainStore>,
}

pub fn engine_fixture(config: EngineConfig, transport: Arc<dyn Transport>) -> EngineFixture {
    let chains = Arc::new(InMemoryChainStore::new());
    let audit = Arc::new(AuditLog::new(chains.clone()));
    let jobs = Arc::new(InMemoryJobStore::new());
    let templates = Arc::new(TemplateRegistry::new());
    let transports = TransportRegistry::new().register(transport);

    let engine = Arc::new(DeliveryEngine::new(
        jobs.clone(),
        audit.clone(),
        templates,
        transports,
        config,
    ));

    EngineFixture {
        engine,
        audit,
        jobs,
        chains,
    }
}
