//! Onboarding system — the campaign setup wizard and its workflow editor.
//!
//! Each user who starts onboarding gets an `OnboardingSession` holding the
//! wizard phase, the selections made so far and the outreach workflow being
//! edited. The `OnboardingManager` owns the live sessions, persists their
//! durable subset and talks to the workflow backend.

pub mod manager;
pub mod model;
pub mod routes;
pub mod session;
pub mod state;

pub use manager::OnboardingManager;
pub use model::{CampaignDataType, ChatMessage, ChatRole, OutreachChannel, PersistedOnboarding};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use session::{EditOutcome, OnboardingSession, SelectionUpdate, SessionSnapshot};
pub use state::OnboardingPhase;
