//! Pluggable transports the delivery engine dispatches through.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{ActionType, DeliveryMethod};
use crate::template::{DeliveryRequirements, RenderedPayload};

/// Transport-level failures. Contained inside the engine's retry loop;
/// they surface to callers only as job state, never as errors from
/// `submit`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote returned a non-2xx status code.
    #[error("remote returned HTTP {0}")]
    HttpStatus(u16),

    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),

    /// The bounded per-attempt timeout elapsed. Counts toward
    /// `attempt_count` exactly like any other transport error.
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport misconfigured: {0}")]
    Misconfigured(String),
}

/// What the transport observed about the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the platform; acknowledgment still outstanding
    Sent,
    /// The platform confirmed receipt within the call (e.g. API 2xx with
    /// confirmation body)
    Delivered,
}

/// Where a dispatch envelope is addressed. Secrets (API tokens, webhook
/// signing keys) deliberately live in transport configuration, not here:
/// the envelope is persisted verbatim with the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTarget {
    Email { recipient: String },
    Api { endpoint: String },
    Webhook { url: String },
    Form { form_url: String },
    Letter { mailing_address: String },
}

impl From<&DeliveryRequirements> for DeliveryTarget {
    fn from(requirements: &DeliveryRequirements) -> Self {
        match requirements {
            DeliveryRequirements::Email { recipient } => DeliveryTarget::Email {
                recipient: recipient.clone(),
            },
            DeliveryRequirements::Api { endpoint, .. } => DeliveryTarget::Api {
                endpoint: endpoint.clone(),
            },
            DeliveryRequirements::Webhook { url, .. } => DeliveryTarget::Webhook {
                url: url.clone(),
            },
            DeliveryRequirements::Form { form_url } => DeliveryTarget::Form {
                form_url: form_url.clone(),
            },
            DeliveryRequirements::Letter { mailing_address } => DeliveryTarget::Letter {
                mailing_address: mailing_address.clone(),
            },
        }
    }
}

/// Everything a transport needs to execute one attempt. Persisted with the
/// job so retries survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub platform: String,
    pub action_type: ActionType,
    pub method: DeliveryMethod,
    pub subject: String,
    pub body: String,
    pub required_documents: Vec<String>,
    pub target: DeliveryTarget,
}

impl DispatchEnvelope {
    pub fn from_rendered(payload: &RenderedPayload) -> Self {
        Self {
            platform: payload.platform.as_str().to_string(),
            action_type: payload.action_type,
            method: payload.method,
            subject: payload.subject.clone(),
            body: payload.body.clone(),
            required_documents: payload.required_documents.clone(),
            target: DeliveryTarget::from(&payload.delivery),
        }
    }
}

/// A delivery channel to third-party platforms. Network calls may block;
/// the engine bounds each attempt with a timeout and never holds an audit
/// chain lock across a dispatch.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// The method this transport serves.
    fn method(&self) -> DeliveryMethod;

    /// Execute one delivery attempt.
    async fn dispatch(
        &self,
        envelope: &DispatchEnvelope,
    ) -> std::result::Result<DispatchOutcome, TransportError>;
}

/// Maps delivery methods to their transports.
#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<DeliveryMethod, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.method(), transport);
        self
    }

    pub fn get(&self, method: DeliveryMethod) -> Option<Arc<dyn Transport>> {
        self.transports.get(&method).cloned()
    }
}
