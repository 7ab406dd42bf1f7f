//! Contract types produced by upstream collaborators.
//!
//! Death verification and policy interpretation happen outside this
//! subsystem (OCR and LLM services respectively); these structs fix the
//! shape of what they hand in.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{ActionType, Platform, PolicyId, SubjectId};

/// Output of the death verification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathVerification {
    pub subject_id: SubjectId,
    pub full_name: String,
    pub date_of_death: NaiveDate,
    pub certificate_id: String,
    /// Extraction confidence in [0.0, 1.0]
    pub confidence: f64,
}

/// Output of the policy interpretation collaborator; feeds template
/// rendering context and delivery job creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyInterpretation {
    pub policy_id: PolicyId,
    pub platform: Platform,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specific_instructions: Option<String>,
}
