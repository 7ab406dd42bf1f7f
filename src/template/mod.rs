//! Notification templates: storage, validation, and deterministic rendering.

mod builtin;

pub use builtin::{builtin_templates, platform_requirements, PlatformRequirements};

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tokio::sync::RwLock;

use crate::audit::AuditLog;
use crate::crypto::{canonicalize_json, hash::rendered_payload_hash, Hash256};
use crate::domain::{
    ActionType, AuditEntryDraft, DeliveryMethod, EventType, Platform, SubjectId, TemplateType,
};
use crate::infra::{Result, TrustError};

/// Placeholders a template body may use without declaring them required.
/// Absent from the rendering context, they fall back to a bracketed
/// `[name]` marker so output stays deterministic.
pub const OPTIONAL_PLACEHOLDERS: &[&str] = &[
    "platform_name",
    "relationship",
    "contact_name",
    "contact_email",
    "contact_phone",
    "contact_address",
    "current_date",
];

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").expect("placeholder regex is valid"))
}

fn dangerous_res() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?is)<script.*?>.*?</script>").expect("script regex is valid"),
            Regex::new(r"(?i)javascript:").expect("javascript regex is valid"),
            Regex::new(r"(?i)\bon\w+\s*=").expect("handler regex is valid"),
        ]
    })
}

/// Method-specific requirements a template must carry to be deliverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryRequirements {
    Email { recipient: String },
    Api { endpoint: String, auth_token: Option<String> },
    Webhook { url: String, signing_secret: Option<String> },
    Form { form_url: String },
    Letter { mailing_address: String },
}

impl DeliveryRequirements {
    /// The template type this requirement set serves.
    pub fn template_type(&self) -> TemplateType {
        match self {
            DeliveryRequirements::Email { .. } => TemplateType::Email,
            DeliveryRequirements::Api { .. } | DeliveryRequirements::Webhook { .. } => {
                TemplateType::Api
            }
            DeliveryRequirements::Form { .. } => TemplateType::Form,
            DeliveryRequirements::Letter { .. } => TemplateType::Letter,
        }
    }

    fn completeness_error(&self) -> Option<String> {
        match self {
            DeliveryRequirements::Email { recipient } if recipient.is_empty() => {
                Some("email template missing recipient".to_string())
            }
            DeliveryRequirements::Api { endpoint, .. } if endpoint.is_empty() => {
                Some("api template missing endpoint".to_string())
            }
            DeliveryRequirements::Webhook { url, .. } if url.is_empty() => {
                Some("webhook template missing url".to_string())
            }
            DeliveryRequirements::Form { form_url } if form_url.is_empty() => {
                Some("form template missing form_url".to_string())
            }
            DeliveryRequirements::Letter { mailing_address } if mailing_address.is_empty() => {
                Some("letter template missing mailing_address".to_string())
            }
            _ => None,
        }
    }
}

/// A notification template for one platform/action/type combination.
#[derive(Debug, Clone)]
pub struct Template {
    pub platform: Platform,
    pub action_type: ActionType,
    pub template_type: TemplateType,
    pub subject_line: String,
    pub body: String,
    /// Placeholders that must resolve to non-empty context values
    pub required_fields: Vec<String>,
    /// Documents the platform expects alongside the notification
    pub required_documents: Vec<String>,
    pub delivery: DeliveryRequirements,
    /// Assigned by the registry; custom templates are versioned by
    /// replacement, never edited in place
    pub version: u32,
}

impl Template {
    fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        for text in [&self.subject_line, &self.body] {
            for capture in placeholder_re().captures_iter(text) {
                let name = capture[1].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

/// Identifier of a registered template version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateId {
    pub platform: Platform,
    pub action_type: ActionType,
    pub template_type: TemplateType,
    pub version: u32,
}

/// Output of a successful render. Identical inputs always produce a
/// byte-identical `canonical` payload, which is what the idempotency key
/// is computed over.
#[derive(Debug, Clone)]
pub struct RenderedPayload {
    pub platform: Platform,
    pub action_type: ActionType,
    pub method: DeliveryMethod,
    pub subject: String,
    pub body: String,
    pub required_documents: Vec<String>,
    pub delivery: DeliveryRequirements,
    /// Canonical JSON of the rendered notification
    pub canonical: String,
    pub payload_hash: Hash256,
}

type TemplateKey = (Platform, ActionType, TemplateType);

/// Stores, validates, and renders notification templates.
///
/// Built-in templates are process-wide immutable state loaded at
/// construction; custom templates are versioned by replacement so
/// historical deliveries stay reproducible.
pub struct TemplateRegistry {
    builtin: HashMap<TemplateKey, Template>,
    custom: RwLock<HashMap<TemplateKey, Vec<Template>>>,
}

impl TemplateRegistry {
    /// Registry pre-loaded with the built-in platform templates.
    pub fn new() -> Self {
        let mut builtin = HashMap::new();
        for template in builtin_templates() {
            builtin.insert(
                (
                    template.platform.clone(),
                    template.action_type,
                    template.template_type,
                ),
                template,
            );
        }
        Self {
            builtin,
            custom: RwLock::new(HashMap::new()),
        }
    }

    /// Syntactic, conservative validation; not a sandboxing guarantee.
    pub fn validate(template: &Template) -> Result<()> {
        let mut reasons = Vec::new();

        if template.subject_line.trim().is_empty() {
            reasons.push("missing required field: subject_line".to_string());
        }
        if template.body.trim().is_empty() {
            reasons.push("missing required field: body".to_string());
        }

        for name in template.placeholders() {
            let declared = template.required_fields.iter().any(|f| f == &name)
                || OPTIONAL_PLACEHOLDERS.contains(&name.as_str());
            if !declared {
                reasons.push(format!("undeclared placeholder: {{{name}}}"));
            }
        }

        for re in dangerous_res() {
            if re.is_match(&template.body) || re.is_match(&template.subject_line) {
                reasons.push("template contains disallowed markup".to_string());
                break;
            }
        }

        if template.delivery.template_type() != template.template_type {
            reasons.push(format!(
                "delivery requirements are for {} but template type is {}",
                template.delivery.template_type(),
                template.template_type
            ));
        }
        if let Some(reason) = template.delivery.completeness_error() {
            reasons.push(reason);
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(TrustError::InvalidTemplate { reasons })
        }
    }

    /// Register a custom template, superseding any prior version for the
    /// same platform/action/type.
    pub async fn register(&self, mut template: Template) -> Result<TemplateId> {
        Self::validate(&template)?;

        let key = (
            template.platform.clone(),
            template.action_type,
            template.template_type,
        );
        let mut custom = self.custom.write().await;
        let versions = custom.entry(key).or_default();
        template.version = versions.len() as u32 + 1;

        let id = TemplateId {
            platform: template.platform.clone(),
            action_type: template.action_type,
            template_type: template.template_type,
            version: template.version,
        };

        tracing::info!(
            platform = %id.platform,
            action_type = %id.action_type,
            template_type = %id.template_type,
            version = id.version,
            "Custom template registered"
        );

        versions.push(template);
        Ok(id)
    }

    /// Register a custom template and record the registration on the
    /// subject's audit chain.
    pub async fn register_audited(
        &self,
        template: Template,
        subject_id: SubjectId,
        audit: &AuditLog,
    ) -> Result<TemplateId> {
        let id = self.register(template).await?;
        audit
            .append(
                AuditEntryDraft::new(
                    subject_id,
                    EventType::TEMPLATE_REGISTERED,
                    format!(
                        "Custom template registered for {}/{} ({}) v{}",
                        id.platform, id.action_type, id.template_type, id.version
                    ),
                )
                .input(serde_json::json!({
                    "platform": id.platform.as_str(),
                    "action_type": id.action_type.as_str(),
                    "template_type": id.template_type.as_str(),
                    "version": id.version,
                })),
            )
            .await?;
        Ok(id)
    }

    /// Best-match lookup: newest custom version, then the built-in for the
    /// exact platform, then the generic fallback for the action.
    pub async fn lookup(
        &self,
        platform: &Platform,
        action_type: ActionType,
        template_type: TemplateType,
    ) -> Result<Template> {
        let key = (platform.clone(), action_type, template_type);

        {
            let custom = self.custom.read().await;
            if let Some(template) = custom.get(&key).and_then(|versions| versions.last()) {
                return Ok(template.clone());
            }
        }

        if let Some(template) = self.builtin.get(&key) {
            return Ok(template.clone());
        }

        let generic_key = (Platform::generic(), action_type, template_type);
        if let Some(template) = self.builtin.get(&generic_key) {
            return Ok(template.clone());
        }

        Err(TrustError::TemplateNotFound {
            platform: platform.as_str().to_string(),
            action_type: action_type.as_str().to_string(),
            template_type: template_type.as_str().to_string(),
        })
    }

    /// Render the best-match template with the given context.
    ///
    /// Fails closed with every absent required field listed. Identical
    /// `(platform, action_type, method, context)` always produce the same
    /// payload bytes; the idempotency key in delivery depends on it.
    pub async fn render(
        &self,
        platform: &Platform,
        action_type: ActionType,
        method: DeliveryMethod,
        context: &BTreeMap<String, String>,
    ) -> Result<RenderedPayload> {
        let template = self
            .lookup(platform, action_type, method.template_type())
            .await?;

        let missing: Vec<String> = template
            .required_fields
            .iter()
            .filter(|field| {
                context
                    .get(field.as_str())
                    .map_or(true, |value| value.trim().is_empty())
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TrustError::MissingRequiredFields { fields: missing });
        }

        let subject = substitute(&template.subject_line, context);
        let body = substitute(&template.body, context);

        let canonical = canonicalize_json(&serde_json::json!({
            "platform": platform.as_str(),
            "action_type": action_type.as_str(),
            "method": method.as_str(),
            "subject": subject,
            "body": body,
            "required_documents": template.required_documents,
            "template_version": template.version,
        }));
        let payload_hash = rendered_payload_hash(canonical.as_bytes());

        Ok(RenderedPayload {
            platform: platform.clone(),
            action_type,
            method,
            subject,
            body,
            required_documents: template.required_documents.clone(),
            delivery: template.delivery.clone(),
            canonical,
            payload_hash,
        })
    }

    /// Enumerate available templates as
    /// `(platform, action, type, latest_version, is_custom)` rows.
    pub async fn list(&self) -> Vec<(Platform, ActionType, TemplateType, u32, bool)> {
        let mut rows: Vec<(Platform, ActionType, TemplateType, u32, bool)> = self
            .builtin
            .values()
            .map(|t| (t.platform.clone(), t.action_type, t.template_type, t.version, false))
            .collect();

        let custom = self.custom.read().await;
        for versions in custom.values() {
            if let Some(latest) = versions.last() {
                rows.push((
                    latest.platform.clone(),
                    latest.action_type,
                    latest.template_type,
                    latest.version,
                    true,
                ));
            }
        }

        rows.sort_by(|a, b| {
            (a.0.as_str(), a.1.as_str(), a.2.as_str()).cmp(&(b.0.as_str(), b.1.as_str(), b.2.as_str()))
        });
        rows
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace `{name}` placeholders from the context; undeclared-but-optional
/// placeholders fall back to a bracketed marker.
fn substitute(text: &str, context: &BTreeMap<String, String>) -> String {
    placeholder_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match context.get(name) {
                Some(value) if !value.is_empty() => value.clone(),
                _ => format!("[{name}]"),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn custom_template() -> Template {
        Template {
            platform: Platform::new("smallbank"),
            action_type: ActionType::Lock,
            template_type: TemplateType::Email,
            subject_line: "Account lock request for {full_name}".to_string(),
            body: "Please lock the account {account_identifier} of {full_name}, \
                   deceased {date_of_death}. Contact: {contact_email}"
                .to_string(),
            required_fields: vec![
                "full_name".to_string(),
                "date_of_death".to_string(),
                "account_identifier".to_string(),
            ],
            required_documents: vec!["death_certificate".to_string()],
            delivery: DeliveryRequirements::Email {
                recipient: "estates@smallbank.example".to_string(),
            },
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_render_builtin_exact_match() {
        let registry = TemplateRegistry::new();
        let rendered = registry
            .render(
                &Platform::google(),
                ActionType::Delete,
                DeliveryMethod::Email,
                &context(&[
                    ("full_name", "John Doe"),
                    ("date_of_death", "2024-01-15"),
                    ("account_identifier", "john@gmail.com"),
                ]),
            )
            .await
            .unwrap();

        assert!(rendered.body.contains("John Doe"));
        assert!(rendered.body.contains("john@gmail.com"));
        assert!(!rendered.body.contains("{full_name}"));
        assert!(matches!(
            rendered.delivery,
            DeliveryRequirements::Email { .. }
        ));
    }

    #[tokio::test]
    async fn test_render_falls_back_to_generic() {
        let registry = TemplateRegistry::new();
        // No builtin for this platform; generic lock template applies
        let rendered = registry
            .render(
                &Platform::new("ChaseBank"),
                ActionType::Lock,
                DeliveryMethod::Email,
                &context(&[
                    ("full_name", "John Doe"),
                    ("date_of_death", "2024-01-15"),
                    ("account_identifier", "****1234"),
                ]),
            )
            .await
            .unwrap();

        assert!(rendered.body.contains("****1234"));
    }

    #[tokio::test]
    async fn test_render_reports_all_missing_fields() {
        let registry = TemplateRegistry::new();
        let err = registry
            .render(
                &Platform::new("ChaseBank"),
                ActionType::Lock,
                DeliveryMethod::Email,
                &context(&[("account_identifier", "****1234")]),
            )
            .await
            .unwrap_err();

        match err {
            TrustError::MissingRequiredFields { fields } => {
                assert!(fields.contains(&"full_name".to_string()));
                assert!(fields.contains(&"date_of_death".to_string()));
                assert_eq!(fields.len(), 2);
            }
            other => panic!("expected MissingRequiredFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_render_rejects_empty_required_value() {
        let registry = TemplateRegistry::new();
        let err = registry
            .render(
                &Platform::google(),
                ActionType::Delete,
                DeliveryMethod::Email,
                &context(&[
                    ("full_name", "  "),
                    ("date_of_death", "2024-01-15"),
                    ("account_identifier", "john@gmail.com"),
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TrustError::MissingRequiredFields { .. }));
    }

    #[tokio::test]
    async fn test_render_deterministic() {
        let registry = TemplateRegistry::new();
        let ctx = context(&[
            ("full_name", "Jane Roe"),
            ("date_of_death", "2024-02-02"),
            ("account_identifier", "jane@gmail.com"),
        ]);

        let a = registry
            .render(&Platform::google(), ActionType::Delete, DeliveryMethod::Email, &ctx)
            .await
            .unwrap();
        let b = registry
            .render(&Platform::google(), ActionType::Delete, DeliveryMethod::Email, &ctx)
            .await
            .unwrap();

        assert_eq!(a.canonical, b.canonical);
        assert_eq!(a.payload_hash, b.payload_hash);
    }

    #[tokio::test]
    async fn test_optional_placeholder_fallback() {
        let registry = TemplateRegistry::new();
        let rendered = registry
            .render(
                &Platform::google(),
                ActionType::Delete,
                DeliveryMethod::Email,
                &context(&[
                    ("full_name", "John Doe"),
                    ("date_of_death", "2024-01-15"),
                    ("account_identifier", "john@gmail.com"),
                ]),
            )
            .await
            .unwrap();

        // contact_name was not supplied; deterministic bracket fallback
        assert!(rendered.body.contains("[contact_name]"));
    }

    #[tokio::test]
    async fn test_register_and_supersede_custom() {
        let registry = TemplateRegistry::new();

        let id1 = registry.register(custom_template()).await.unwrap();
        assert_eq!(id1.version, 1);

        let mut replacement = custom_template();
        replacement.body.push_str(" Urgent.");
        let id2 = registry.register(replacement).await.unwrap();
        assert_eq!(id2.version, 2);

        let template = registry
            .lookup(
                &Platform::new("smallbank"),
                ActionType::Lock,
                TemplateType::Email,
            )
            .await
            .unwrap();
        assert_eq!(template.version, 2);
        assert!(template.body.ends_with("Urgent."));
    }

    #[tokio::test]
    async fn test_register_rejects_undeclared_placeholder() {
        let registry = TemplateRegistry::new();
        let mut template = custom_template();
        template.body.push_str(" SSN: {ssn_last_four}");

        let err = registry.register(template).await.unwrap_err();
        match err {
            TrustError::InvalidTemplate { reasons } => {
                assert!(reasons
                    .iter()
                    .any(|r| r.contains("undeclared placeholder: {ssn_last_four}")));
            }
            other => panic!("expected InvalidTemplate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_rejects_markup_injection() {
        let registry = TemplateRegistry::new();

        for payload in [
            "<script>alert(1)</script>",
            "click javascript:steal()",
            "<img onerror= x>",
        ] {
            let mut template = custom_template();
            template.body = format!("{} {}", template.body, payload);
            let err = registry.register(template).await.unwrap_err();
            assert!(
                matches!(err, TrustError::InvalidTemplate { ref reasons }
                    if reasons.iter().any(|r| r.contains("disallowed markup"))),
                "payload not rejected: {payload}"
            );
        }
    }

    #[tokio::test]
    async fn test_register_rejects_incomplete_delivery_requirements() {
        let registry = TemplateRegistry::new();
        let mut template = custom_template();
        template.delivery = DeliveryRequirements::Email {
            recipient: String::new(),
        };

        let err = registry.register(template).await.unwrap_err();
        assert!(matches!(err, TrustError::InvalidTemplate { ref reasons }
            if reasons.iter().any(|r| r.contains("missing recipient"))));
    }

    #[tokio::test]
    async fn test_register_rejects_type_mismatch() {
        let registry = TemplateRegistry::new();
        let mut template = custom_template();
        template.delivery = DeliveryRequirements::Form {
            form_url: "https://example.com/form".to_string(),
        };

        let err = registry.register(template).await.unwrap_err();
        assert!(matches!(err, TrustError::InvalidTemplate { .. }));
    }

    #[tokio::test]
    async fn test_register_audited_records_entry() {
        use crate::audit::AuditLog;
        use crate::infra::InMemoryChainStore;
        use std::sync::Arc;

        let registry = TemplateRegistry::new();
        let log = AuditLog::new(Arc::new(InMemoryChainStore::new()));
        let subject = SubjectId::new();

        let id = registry
            .register_audited(custom_template(), subject, &log)
            .await
            .unwrap();
        assert_eq!(id.version, 1);

        let page = log
            .query(subject, &crate::audit::AuditQueryFilters::default(), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(
            page.entries[0].event_type.as_str(),
            EventType::TEMPLATE_REGISTERED
        );
    }

    #[tokio::test]
    async fn test_unknown_combination_is_not_found() {
        let registry = TemplateRegistry::new();
        let err = registry
            .lookup(
                &Platform::new("nowhere"),
                ActionType::Transfer,
                TemplateType::Letter,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrustError::TemplateNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_includes_builtin_and_custom() {
        let registry = TemplateRegistry::new();
        let builtin_count = registry.list().await.len();
        assert!(builtin_count > 0);

        registry.register(custom_template()).await.unwrap();
        let rows = registry.list().await;
        assert_eq!(rows.len(), builtin_count + 1);
        assert!(rows.iter().any(|(p, _, _, _, custom)| *custom && p.as_str() == "smallbank"));
    }
}
