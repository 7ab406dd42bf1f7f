//! Built-in notification templates and platform requirements.
//!
//! Loaded once at registry construction; process-wide immutable state.

use std::collections::HashMap;

use crate::domain::{ActionType, Platform, TemplateType};

use super::{DeliveryRequirements, Template};

/// Per-platform documentation requirements and contact routes.
#[derive(Debug, Clone)]
pub struct PlatformRequirements {
    pub required_documents: Vec<String>,
    pub contact_methods: Vec<String>,
    pub special_requirements: Vec<String>,
    pub processing_time: String,
    pub contact_email: Option<String>,
    pub form_url: Option<String>,
    pub phone: Option<String>,
}

fn docs(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Requirements directory for the platforms this subsystem ships templates
/// for, keyed by normalized platform name.
pub fn platform_requirements() -> HashMap<String, PlatformRequirements> {
    let mut reqs = HashMap::new();

    reqs.insert(
        "google".to_string(),
        PlatformRequirements {
            required_documents: docs(&["death_certificate", "id_verification", "account_recovery_info"]),
            contact_methods: docs(&["email", "form"]),
            special_requirements: docs(&["Google account recovery information required"]),
            processing_time: "2-4 weeks".to_string(),
            contact_email: Some("accounts-support@google.com".to_string()),
            form_url: Some("https://support.google.com/accounts/contact/deceased".to_string()),
            phone: None,
        },
    );

    reqs.insert(
        "facebook".to_string(),
        PlatformRequirements {
            required_documents: docs(&["death_certificate", "relationship_proof"]),
            contact_methods: docs(&["form"]),
            special_requirements: docs(&["Must use the memorialization request form"]),
            processing_time: "1-2 weeks".to_string(),
            contact_email: None,
            form_url: Some("https://www.facebook.com/help/contact/228813257197480".to_string()),
            phone: None,
        },
    );

    reqs.insert(
        "chase_bank".to_string(),
        PlatformRequirements {
            required_documents: docs(&["death_certificate", "estate_documents", "id_verification"]),
            contact_methods: docs(&["phone", "mail", "email"]),
            special_requirements: docs(&[
                "Contact estate services department",
                "Executor documentation required",
            ]),
            processing_time: "2-6 weeks".to_string(),
            contact_email: Some("estate.services@chase.com".to_string()),
            form_url: None,
            phone: Some("1-800-935-9935".to_string()),
        },
    );

    reqs
}

/// The built-in template pack. Generic templates cover every action type so
/// rendering always has a fallback.
pub fn builtin_templates() -> Vec<Template> {
    let mut templates = Vec::new();

    templates.push(Template {
        platform: Platform::google(),
        action_type: ActionType::Delete,
        template_type: TemplateType::Email,
        subject_line: "Request for Account Closure - {full_name} (Deceased)".to_string(),
        body: "Dear Google Account Support,\n\n\
               I am writing to request the closure of a Google account belonging to \
               {full_name}, who passed away on {date_of_death}.\n\n\
               Account Information:\n\
               - Account Holder: {full_name}\n\
               - Email Address: {account_identifier}\n\
               - Date of Death: {date_of_death}\n\n\
               I am {relationship} and am authorized to handle the digital affairs of \
               the deceased. I am requesting that this account be permanently deleted \
               in accordance with the deceased person's wishes. I have attached a \
               certified copy of the death certificate and my identification as the \
               authorized representative.\n\n\
               Sincerely,\n{contact_name}\n{contact_email}\n{contact_phone}"
            .to_string(),
        required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
        required_documents: docs(&["death_certificate", "id_verification", "account_recovery_info"]),
        delivery: DeliveryRequirements::Email {
            recipient: "accounts-support@google.com".to_string(),
        },
        version: 0,
    });

    templates.push(Template {
        platform: Platform::google(),
        action_type: ActionType::Memorialize,
        template_type: TemplateType::Email,
        subject_line: "Request for Account Memorialization - {full_name} (Deceased)".to_string(),
        body: "Dear Google Account Support,\n\n\
               I am writing to request the memorialization of a Google account \
               belonging to {full_name}, who passed away on {date_of_death}.\n\n\
               Account Information:\n\
               - Account Holder: {full_name}\n\
               - Email Address: {account_identifier}\n\
               - Date of Death: {date_of_death}\n\n\
               I am {relationship} and am requesting that this account be converted \
               to a memorial account to preserve the digital legacy of the deceased. \
               The required documentation is attached.\n\n\
               Sincerely,\n{contact_name}\n{contact_email}"
            .to_string(),
        required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
        required_documents: docs(&["death_certificate", "relationship_proof", "account_recovery_info"]),
        delivery: DeliveryRequirements::Email {
            recipient: "accounts-support@google.com".to_string(),
        },
        version: 0,
    });

    templates.push(Template {
        platform: Platform::facebook(),
        action_type: ActionType::Delete,
        template_type: TemplateType::Form,
        subject_line: "Request for Account Deletion - {full_name} (Deceased)".to_string(),
        body: "I am submitting a request for the deletion of a Facebook account \
               belonging to {full_name}, who passed away on {date_of_death}.\n\n\
               Account Information:\n\
               - Account Holder: {full_name}\n\
               - Profile URL/Email: {account_identifier}\n\
               - Date of Death: {date_of_death}\n\n\
               The deceased person specifically requested that their Facebook account \
               be deleted after their death. I am {relationship} and have the \
               authority to make this request. The death certificate and proof of my \
               relationship to the deceased are attached.\n\n\
               Contact Information:\n{contact_name}\n{contact_email}"
            .to_string(),
        required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
        required_documents: docs(&["death_certificate", "relationship_proof"]),
        delivery: DeliveryRequirements::Form {
            form_url: "https://www.facebook.com/help/contact/228813257197480".to_string(),
        },
        version: 0,
    });

    templates.push(Template {
        platform: Platform::facebook(),
        action_type: ActionType::Memorialize,
        template_type: TemplateType::Form,
        subject_line: "Request for Account Memorialization - {full_name} (Deceased)".to_string(),
        body: "I am submitting a request for the memorialization of a Facebook \
               account belonging to {full_name}, who passed away on {date_of_death}.\n\n\
               Account Information:\n\
               - Account Holder: {full_name}\n\
               - Profile URL/Email: {account_identifier}\n\
               - Date of Death: {date_of_death}\n\n\
               I would like this account converted to a memorial account. I am \
               {relationship} and have the authority to make this request. The \
               required documentation is attached.\n\n\
               Contact Information:\n{contact_name}\n{contact_email}"
            .to_string(),
        required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
        required_documents: docs(&["death_certificate", "relationship_proof"]),
        delivery: DeliveryRequirements::Form {
            form_url: "https://www.facebook.com/help/contact/228813257197480".to_string(),
        },
        version: 0,
    });

    templates.push(Template {
        platform: Platform::chase_bank(),
        action_type: ActionType::Lock,
        template_type: TemplateType::Email,
        subject_line: "Estate Services - Account Security Request for {full_name} (Deceased)"
            .to_string(),
        body: "Dear Chase Estate Services,\n\n\
               I am writing to notify you of the death of {full_name} and to request \
               that their banking accounts be secured immediately.\n\n\
               Deceased Account Holder Information:\n\
               - Full Name: {full_name}\n\
               - Date of Death: {date_of_death}\n\
               - Account Number/Identifier: {account_identifier}\n\n\
               I am {relationship} and the authorized representative for the estate. \
               I am requesting that all accounts be frozen to prevent unauthorized \
               access while estate matters are being resolved. A certified copy of \
               the death certificate, estate documentation, and my identification \
               are attached.\n\n\
               Contact Information for Follow-up:\n{contact_name}\n{contact_email}\n\
               {contact_phone}\n\nSincerely,\n{contact_name}"
            .to_string(),
        required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
        required_documents: docs(&["death_certificate", "estate_documents", "id_verification"]),
        delivery: DeliveryRequirements::Email {
            recipient: "estate.services@chase.com".to_string(),
        },
        version: 0,
    });

    templates.push(Template {
        platform: Platform::chase_bank(),
        action_type: ActionType::Delete,
        template_type: TemplateType::Email,
        subject_line: "Estate Services - Account Closure Request for {full_name} (Deceased)"
            .to_string(),
        body: "Dear Chase Estate Services,\n\n\
               I am writing to notify you of the death of {full_name} and to request \
               the closure of their banking accounts.\n\n\
               Deceased Account Holder Information:\n\
               - Full Name: {full_name}\n\
               - Date of Death: {date_of_death}\n\
               - Account Number/Identifier: {account_identifier}\n\n\
               I am {relationship} and the authorized representative for the estate. \
               Please contact me to discuss the account closure process, fund \
               distribution, and any additional requirements. Estate documentation \
               is attached.\n\n\
               Contact Information:\n{contact_name}\n{contact_email}\n{contact_phone}"
            .to_string(),
        required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
        required_documents: docs(&["death_certificate", "estate_documents", "id_verification"]),
        delivery: DeliveryRequirements::Email {
            recipient: "estate.services@chase.com".to_string(),
        },
        version: 0,
    });

    // Generic fallbacks, one per action type
    for (action, request_line) in [
        (ActionType::Delete, "that their account be permanently deleted"),
        (
            ActionType::Memorialize,
            "that their account be converted to a memorial account",
        ),
        (
            ActionType::Lock,
            "that their account be locked against further access",
        ),
        (
            ActionType::Transfer,
            "that their account be transferred to the estate's control",
        ),
    ] {
        templates.push(Template {
            platform: Platform::generic(),
            action_type: action,
            template_type: TemplateType::Email,
            subject_line: format!(
                "Death Notification - Account {} Request for {{full_name}}",
                capitalized(action)
            ),
            body: format!(
                "Dear {{platform_name}} Customer Service,\n\n\
                 I am writing to notify you of the death of {{full_name}} and to request \
                 {request_line}.\n\n\
                 Account Information:\n\
                 - Account Holder: {{full_name}}\n\
                 - Account Identifier: {{account_identifier}}\n\
                 - Date of Death: {{date_of_death}}\n\n\
                 I am {{relationship}} and am authorized to handle the digital affairs of \
                 the deceased. I have attached the required documentation as per your \
                 platform's procedures.\n\n\
                 Sincerely,\n{{contact_name}}\n{{contact_email}}\n{{contact_phone}}"
            ),
            required_fields: fields(&["full_name", "date_of_death", "account_identifier"]),
            required_documents: docs(&["death_certificate", "id_verification"]),
            delivery: DeliveryRequirements::Email {
                recipient: "support@platform.invalid".to_string(),
            },
            version: 0,
        });
    }

    templates
}

fn capitalized(action: ActionType) -> String {
    let s = action.as_str();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRegistry;

    #[test]
    fn test_all_builtin_templates_are_valid() {
        for template in builtin_templates() {
            TemplateRegistry::validate(&template).unwrap_or_else(|e| {
                panic!(
                    "builtin template {}/{} invalid: {e}",
                    template.platform, template.action_type
                )
            });
        }
    }

    #[test]
    fn test_generic_covers_every_action() {
        let templates = builtin_templates();
        for action in [
            ActionType::Delete,
            ActionType::Memorialize,
            ActionType::Lock,
            ActionType::Transfer,
        ] {
            assert!(
                templates
                    .iter()
                    .any(|t| t.platform == Platform::generic() && t.action_type == action),
                "no generic template for {action}"
            );
        }
    }

    #[test]
    fn test_platform_requirements_known_platforms() {
        let reqs = platform_requirements();
        assert!(reqs.contains_key("google"));
        assert!(reqs.contains_key("facebook"));
        assert!(reqs.contains_key("chase_bank"));
        assert!(reqs["chase_bank"]
            .required_documents
            .contains(&"estate_documents".to_string()));
    }
}
