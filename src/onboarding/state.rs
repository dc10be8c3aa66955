//! Onboarding wizard phases.

use serde::{Deserialize, Serialize};

/// The phases of the onboarding wizard.
///
/// Progresses linearly: NotStarted → Channels → Platforms → Workflow →
/// Review → Complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingPhase {
    #[default]
    NotStarted,
    /// Pick outreach channels (LinkedIn, email).
    Channels,
    /// Pick lead-source platforms and campaign data type.
    Platforms,
    /// Build the sequence in the visual editor.
    Workflow,
    Review,
    Complete,
}

impl OnboardingPhase {
    /// Only the immediate successor is reachable; phases cannot be skipped or revisited.
    pub fn can_transition_to(&self, target: OnboardingPhase) -> bool {
        self.next() == Some(target)
    }

    /// `Complete` ends the wizard and tears the session down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the workflow editor accepts edits in this phase.
    pub fn allows_editing(&self) -> bool {
        !self.is_terminal()
    }

    /// Successor in the wizard, `None` once complete.
    pub fn next(&self) -> Option<OnboardingPhase> {
        use OnboardingPhase::*;
        match self {
            NotStarted => Some(Channels),
            Channels => Some(Platforms),
            Platforms => Some(Workflow),
            Workflow => Some(Review),
            Review => Some(Complete),
            Complete => None,
        }
    }
}

impl std::fmt::Display for OnboardingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Channels => "channels",
            Self::Platforms => "platforms",
            Self::Workflow => "workflow",
            Self::Review => "review",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}
