//! Onboarding selections, chat transcript and the persisted subset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowGraph;

/// An outreach channel the campaign will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachChannel {
    Linkedin,
    Email,
}

impl std::fmt::Display for OutreachChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linkedin => write!(f, "linkedin"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// Where the campaign's leads come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignDataType {
    /// Leads searched and enriched through Apollo.
    Apollo,
    CsvUpload,
    Manual,
}

impl std::fmt::Display for CampaignDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apollo => write!(f, "apollo"),
            Self::CsvUpload => write!(f, "csv_upload"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One line of the AI campaign-builder chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// The fields of an onboarding session that survive a reload.
///
/// Stored in the `settings` table as JSON under
/// [`settings_keys::ONBOARDING_STORAGE`] and restored verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedOnboarding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowGraph>,
    #[serde(default)]
    pub channels: Vec<OutreachChannel>,
    #[serde(default)]
    pub selected_platforms: Vec<String>,
    #[serde(default)]
    pub ai_chat: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_data_type: Option<CampaignDataType>,
}

/// Settings keys used for onboarding persistence.
pub mod settings_keys {
    /// Key for the persisted onboarding blob in the settings table.
    pub const ONBOARDING_STORAGE: &str = "onboarding-storage";
}
