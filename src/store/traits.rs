//! `Database` trait — single async interface for onboarding persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::workflow::WorkflowGraph;

/// A workflow the backend accepted, kept as an audit trail.
#[derive(Debug, Clone)]
pub struct SavedWorkflow {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: Uuid,
    pub workflow: WorkflowGraph,
    /// Identifier returned by the backend, when it sends one.
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SavedWorkflow {
    pub fn new(
        user_id: impl Into<String>,
        session_id: Uuid,
        workflow: WorkflowGraph,
        remote_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            session_id,
            workflow,
            remote_id,
            created_at: Utc::now(),
        }
    }
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get a per-user setting value.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Upsert a per-user setting value.
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Delete a setting. Returns true if a row was removed.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;

    // ── Saved workflows ─────────────────────────────────────────────

    async fn record_saved_workflow(&self, saved: &SavedWorkflow) -> Result<(), DatabaseError>;

    /// Most recent saves for a user, newest first.
    async fn list_saved_workflows(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SavedWorkflow>, DatabaseError>;
}
