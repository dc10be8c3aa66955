//! Outreach Flow — onboarding wizard and workflow editor backend.

pub mod backend;
pub mod config;
pub mod error;
pub mod fence;
pub mod notify;
pub mod onboarding;
pub mod store;
pub mod workflow;
