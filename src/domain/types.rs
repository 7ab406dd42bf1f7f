//! Identifier newtypes and classification enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject identifier (the user or estate case an event concerns).
///
/// Each subject owns exactly one audit chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub uuid::Uuid);

impl SubjectId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Action policy identifier (one policy fans out to N platform jobs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub uuid::Uuid);

impl PolicyId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target platform classification.
/// A simple string wrapper that handles both known and custom platforms;
/// values are normalized to lowercase for lookup stability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(pub String);

impl Platform {
    pub fn new(platform: impl Into<String>) -> Self {
        Self(platform.into().to_lowercase())
    }

    pub fn google() -> Self {
        Self("google".to_string())
    }

    pub fn facebook() -> Self {
        Self("facebook".to_string())
    }

    pub fn chase_bank() -> Self {
        Self("chase_bank".to_string())
    }

    pub fn generic() -> Self {
        Self("generic".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Audit event type classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(pub String);

impl EventType {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self(event_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Upstream events
    pub const ASSET_FROZEN: &'static str = "asset_frozen";
    pub const DEATH_VERIFIED: &'static str = "death_verified";
    pub const POLICY_INTERPRETED: &'static str = "policy_interpreted";
    pub const CERTIFICATE_VERIFIED: &'static str = "certificate_verified";

    // Delivery lifecycle events (emitted by the engine)
    pub const NOTIFICATION_QUEUED: &'static str = "notification_queued";
    pub const NOTIFICATION_SENT: &'static str = "notification_sent";
    pub const NOTIFICATION_DELIVERED: &'static str = "notification_delivered";
    pub const NOTIFICATION_FAILED: &'static str = "notification_failed";
    pub const NOTIFICATION_EXPIRED: &'static str = "notification_expired";
    pub const NOTIFICATION_BATCH_SUBMITTED: &'static str = "notification_batch_submitted";

    // Template registry events
    pub const TEMPLATE_REGISTERED: &'static str = "template_registered";
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Outcome classification carried by every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Success,
    Failure,
    Pending,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Success => "success",
            EntryStatus::Failure => "failure",
            EntryStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(EntryStatus::Success),
            "failure" => Some(EntryStatus::Failure),
            "pending" => Some(EntryStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action requested against a platform account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Delete,
    Memorialize,
    Lock,
    Transfer,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Delete => "delete",
            ActionType::Memorialize => "memorialize",
            ActionType::Lock => "lock",
            ActionType::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delete" => Some(ActionType::Delete),
            "memorialize" => Some(ActionType::Memorialize),
            "lock" => Some(ActionType::Lock),
            "transfer" => Some(ActionType::Transfer),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a rendered notification reaches the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Email,
    Api,
    Webhook,
    Form,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::Email => "email",
            DeliveryMethod::Api => "api",
            DeliveryMethod::Webhook => "webhook",
            DeliveryMethod::Form => "form",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(DeliveryMethod::Email),
            "api" => Some(DeliveryMethod::Api),
            "webhook" => Some(DeliveryMethod::Webhook),
            "form" => Some(DeliveryMethod::Form),
            _ => None,
        }
    }

    /// The template type that renders content for this method.
    /// Webhook payloads reuse the API template shape.
    pub fn template_type(&self) -> TemplateType {
        match self {
            DeliveryMethod::Email => TemplateType::Email,
            DeliveryMethod::Api | DeliveryMethod::Webhook => TemplateType::Api,
            DeliveryMethod::Form => TemplateType::Form,
        }
    }

    /// Fire-and-forget methods have no acknowledgment channel and go
    /// straight to `delivered` on transport success.
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, DeliveryMethod::Form)
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification content shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Email,
    Api,
    Form,
    Letter,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::Email => "email",
            TemplateType::Api => "api",
            TemplateType::Form => "form",
            TemplateType::Letter => "letter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(TemplateType::Email),
            "api" => Some(TemplateType::Api),
            "form" => Some(TemplateType::Form),
            "letter" => Some(TemplateType::Letter),
            _ => None,
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serde module for serializing Hash256 as hex strings
pub mod hash256_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes for Hash256"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_normalized_lowercase() {
        assert_eq!(Platform::new("ChaseBank").as_str(), "chasebank");
        assert_eq!(Platform::from("Google"), Platform::google());
    }

    #[test]
    fn test_action_type_roundtrip() {
        for action in [
            ActionType::Delete,
            ActionType::Memorialize,
            ActionType::Lock,
            ActionType::Transfer,
        ] {
            assert_eq!(ActionType::parse(action.as_str()), Some(action));
        }
        assert_eq!(ActionType::parse("freeze"), None);
    }

    #[test]
    fn test_delivery_method_template_mapping() {
        assert_eq!(DeliveryMethod::Email.template_type(), TemplateType::Email);
        assert_eq!(DeliveryMethod::Api.template_type(), TemplateType::Api);
        assert_eq!(DeliveryMethod::Webhook.template_type(), TemplateType::Api);
        assert_eq!(DeliveryMethod::Form.template_type(), TemplateType::Form);
    }

    #[test]
    fn test_fire_and_forget() {
        assert!(DeliveryMethod::Form.is_fire_and_forget());
        assert!(!DeliveryMethod::Email.is_fire_and_forget());
        assert!(!DeliveryMethod::Api.is_fire_and_forget());
        assert!(!DeliveryMethod::Webhook.is_fire_and_forget());
    }

    #[test]
    fn test_entry_status_serialization() {
        let json = serde_json::to_string(&EntryStatus::Success).unwrap();
        assert_eq!(json, r#""success""#);
        let parsed: EntryStatus = serde_json::from_str(r#""pending""#).unwrap();
        assert_eq!(parsed, EntryStatus::Pending);
    }
}
