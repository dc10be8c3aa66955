//! OnboardingManager — session registry, persistence and backend calls.
//!
//! Every session lives behind its own `RwLock`. A change cycle (mutate,
//! publish, persist) runs under that session's write lock. Backend calls
//! read what they need, release the lock, and re-apply their result only
//! if the request fence still considers it current.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, SaveReceipt};
use crate::error::SessionError;
use crate::fence::RequestFence;
use crate::notify::{EventHub, NotificationLevel, SessionEvent};
use crate::store::{Database, SavedWorkflow};
use crate::workflow::{
    DropEvent, EditorGraph, HistoryCommand, KeyPress, PreviewStep, SkipReason, StepType,
    WorkflowGraph,
};

use super::model::{settings_keys, ChatRole, PersistedOnboarding};
use super::session::{EditOutcome, OnboardingSession, SelectionUpdate, SessionSnapshot};
use super::state::OnboardingPhase;

pub type SharedSession = Arc<RwLock<OnboardingSession>>;

/// Coordinates live onboarding sessions.
pub struct OnboardingManager {
    db: Arc<dyn Database>,
    backend: Arc<dyn Backend>,
    events: Arc<EventHub>,
    fence: RequestFence,
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
    history_limit: usize,
}

fn save_resource(id: Uuid) -> String {
    format!("save:{id}")
}

fn preview_resource(id: Uuid) -> String {
    format!("preview:{id}")
}

impl OnboardingManager {
    pub fn new(
        db: Arc<dyn Database>,
        backend: Arc<dyn Backend>,
        events: Arc<EventHub>,
        history_limit: usize,
    ) -> Self {
        Self {
            db,
            backend,
            events,
            fence: RequestFence::new(),
            sessions: RwLock::new(HashMap::new()),
            history_limit,
        }
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    /// Start (or resume) onboarding for a user.
    ///
    /// A live session for the same user is returned as-is; otherwise a new
    /// one is restored from the persisted blob.
    pub async fn start_session(&self, user_id: &str) -> Result<SessionSnapshot, SessionError> {
        if user_id.trim().is_empty() {
            return Err(SessionError::InvalidRequest("user_id is required".to_string()));
        }

        if let Some(snapshot) = live_session_for(&*self.sessions.read().await, user_id).await {
            return Ok(snapshot);
        }

        let persisted = self.load_persisted(user_id).await?;
        let session = OnboardingSession::restore(user_id, persisted, self.history_limit);

        let mut sessions = self.sessions.write().await;
        // Another start for this user may have won while the blob loaded.
        if let Some(snapshot) = live_session_for(&sessions, user_id).await {
            return Ok(snapshot);
        }
        let snapshot = session.snapshot();
        sessions.insert(snapshot.id, Arc::new(RwLock::new(session)));
        info!(session_id = %snapshot.id, user_id, "Onboarding session started");
        Ok(snapshot)
    }

    pub async fn session(&self, id: Uuid) -> Result<SharedSession, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound { id })
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let session = self.session(id).await?;
        let guard = session.read().await;
        Ok(guard.snapshot())
    }

    // ── Graph edits ─────────────────────────────────────────────────

    pub async fn apply_editor_change(
        &self,
        id: Uuid,
        editor: EditorGraph,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.apply_editor_change(editor)).await
    }

    pub async fn connect(
        &self,
        id: Uuid,
        source: &str,
        target: &str,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.connect(source, target)).await
    }

    pub async fn delete_nodes(&self, id: Uuid, ids: &[String]) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.delete_nodes(ids)).await
    }

    pub async fn drop_node(&self, id: Uuid, event: &DropEvent) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.drop_node(event)).await
    }

    pub async fn click_palette_item(
        &self,
        id: Uuid,
        step_type: StepType,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.click_palette_item(step_type)).await
    }

    pub async fn update_node_data(
        &self,
        id: Uuid,
        node_id: &str,
        data: serde_json::Value,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.update_node_data(node_id, data)).await
    }

    pub async fn seed_preview(
        &self,
        id: Uuid,
        steps: Vec<PreviewStep>,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.seed_from_preview(steps)).await
    }

    /// Install a workflow produced outside the editor (e.g. by the AI
    /// campaign builder).
    pub async fn replace_workflow(
        &self,
        id: Uuid,
        graph: WorkflowGraph,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(id, |s| s.replace_from_external(graph)).await
    }

    // ── History ─────────────────────────────────────────────────────

    pub async fn undo(&self, id: Uuid) -> Result<bool, SessionError> {
        self.history(id, |s| s.undo()).await
    }

    pub async fn redo(&self, id: Uuid) -> Result<bool, SessionError> {
        self.history(id, |s| s.redo()).await
    }

    pub async fn handle_shortcut(
        &self,
        id: Uuid,
        key: &KeyPress,
    ) -> Result<Option<HistoryCommand>, SessionError> {
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        let command = guard.handle_shortcut(key)?;
        if command.is_some() {
            self.publish_graph(&guard);
            self.persist(&guard).await;
        }
        Ok(command)
    }

    // ── Wizard ──────────────────────────────────────────────────────

    pub async fn set_selections(
        &self,
        id: Uuid,
        update: SelectionUpdate,
    ) -> Result<SessionSnapshot, SessionError> {
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        guard.set_selections(update);
        self.persist(&guard).await;
        Ok(guard.snapshot())
    }

    pub async fn push_chat_message(
        &self,
        id: Uuid,
        role: ChatRole,
        content: String,
    ) -> Result<SessionSnapshot, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::InvalidRequest(
                "chat message is empty".to_string(),
            ));
        }
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        guard.push_chat_message(role, content);
        self.persist(&guard).await;
        Ok(guard.snapshot())
    }

    /// Move the wizard forward one phase. Reaching `complete` tears the
    /// session down.
    pub async fn advance(&self, id: Uuid) -> Result<OnboardingPhase, SessionError> {
        let session = self.session(id).await?;
        let (phase, user_id) = {
            let mut guard = session.write().await;
            let phase = guard.advance()?;
            if !phase.is_terminal() {
                self.persist(&guard).await;
            }
            (phase, guard.user_id().to_string())
        };
        if phase.is_terminal() {
            self.teardown(id, &user_id).await;
        }
        Ok(phase)
    }

    /// Finish onboarding from the review phase.
    pub async fn complete(&self, id: Uuid) -> Result<OnboardingPhase, SessionError> {
        {
            let session = self.session(id).await?;
            let guard = session.read().await;
            if guard.phase().next() != Some(OnboardingPhase::Complete) {
                return Err(SessionError::InvalidTransition {
                    id,
                    phase: guard.phase().to_string(),
                    target: OnboardingPhase::Complete.to_string(),
                });
            }
        }
        self.advance(id).await
    }

    pub async fn reset(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        guard.reset();
        self.publish_graph(&guard);
        self.persist(&guard).await;
        Ok(guard.snapshot())
    }

    // ── Backend ─────────────────────────────────────────────────────

    /// Send the session's workflow to the backend.
    ///
    /// Returns `None` when a newer save for the same session was dispatched
    /// while this one was in flight.
    pub async fn save_workflow(&self, id: Uuid) -> Result<Option<SaveReceipt>, SessionError> {
        let (workflow, user_id) = {
            let session = self.session(id).await?;
            let guard = session.read().await;
            (guard.workflow().clone(), guard.user_id().to_string())
        };

        let ticket = self.fence.begin(save_resource(id));
        let result = self.backend.save_workflow(&workflow).await;
        if !self.fence.is_current(&ticket) {
            return Ok(None);
        }

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                self.events.notify(
                    id,
                    NotificationLevel::Error,
                    format!("Failed to save workflow: {e}"),
                );
                return Err(e.into());
            }
        };

        let saved = SavedWorkflow::new(user_id, id, workflow, receipt.workflow_id.clone());
        if let Err(e) = self.db.record_saved_workflow(&saved).await {
            warn!(session_id = %id, error = %e, "Failed to record saved workflow");
        }
        info!(session_id = %id, remote_id = ?receipt.workflow_id, "Workflow saved");
        self.events
            .notify(id, NotificationLevel::Success, "Workflow saved");
        Ok(Some(receipt))
    }

    /// Fetch the preview list for the session's campaign and install it.
    pub async fn refresh_preview(&self, id: Uuid) -> Result<EditOutcome, SessionError> {
        let campaign_data_type = {
            let session = self.session(id).await?;
            let guard = session.read().await;
            guard.campaign_data_type()
        };

        let ticket = self.fence.begin(preview_resource(id));
        let result = self.backend.fetch_preview(campaign_data_type).await;
        if !self.fence.is_current(&ticket) {
            return Ok(EditOutcome::Ignored);
        }

        let steps = match result {
            Ok(steps) => steps,
            Err(e) => {
                self.events.notify(
                    id,
                    NotificationLevel::Error,
                    format!("Failed to load workflow preview: {e}"),
                );
                return Err(e.into());
            }
        };

        // The session may have been torn down while the request was in flight.
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        let outcome = guard.accept_preview(steps);
        if outcome.is_applied() {
            self.publish_graph(&guard);
        }
        self.persist(&guard).await;
        Ok(outcome)
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Run one graph edit under the session's write lock, then publish,
    /// toast and persist as the outcome requires.
    async fn edit<F>(&self, id: Uuid, f: F) -> Result<EditOutcome, SessionError>
    where
        F: FnOnce(&mut OnboardingSession) -> Result<EditOutcome, SessionError>,
    {
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        let outcome = f(&mut guard)?;

        match outcome {
            EditOutcome::Applied { generation } => {
                debug!(session_id = %id, generation, "Graph edit applied");
                self.publish_graph(&guard);
                self.persist(&guard).await;
            }
            EditOutcome::Rejected { ref message } => {
                self.events.notify(id, NotificationLevel::Warning, message.clone());
            }
            EditOutcome::Skipped(SkipReason::Busy(phase)) => {
                debug!(session_id = %id, ?phase, "Edit skipped, synchronizer busy");
            }
            EditOutcome::Skipped(_) | EditOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    async fn history<F>(&self, id: Uuid, f: F) -> Result<bool, SessionError>
    where
        F: FnOnce(&mut OnboardingSession) -> Result<bool, SessionError>,
    {
        let session = self.session(id).await?;
        let mut guard = session.write().await;
        let changed = f(&mut guard)?;
        if changed {
            self.publish_graph(&guard);
            self.persist(&guard).await;
        }
        Ok(changed)
    }

    fn publish_graph(&self, session: &OnboardingSession) {
        self.events.publish(SessionEvent::GraphUpdated {
            session_id: session.id(),
            generation: session.generation(),
            editor: session.editor().clone(),
            can_undo: session.can_undo(),
            can_redo: session.can_redo(),
        });
    }

    async fn load_persisted(&self, user_id: &str) -> Result<PersistedOnboarding, SessionError> {
        let Some(value) = self
            .db
            .get_setting(user_id, settings_keys::ONBOARDING_STORAGE)
            .await?
        else {
            return Ok(PersistedOnboarding::default());
        };
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(user_id, error = %e, "Discarding unreadable onboarding storage");
            PersistedOnboarding::default()
        }))
    }

    /// Persist the session's durable subset to the settings table.
    async fn persist(&self, session: &OnboardingSession) {
        let value = match serde_json::to_value(session.persisted()) {
            Ok(v) => v,
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Failed to serialize onboarding storage");
                return;
            }
        };
        if let Err(e) = self
            .db
            .set_setting(session.user_id(), settings_keys::ONBOARDING_STORAGE, &value)
            .await
        {
            warn!(session_id = %session.id(), error = %e, "Failed to persist onboarding storage");
        }
    }

    async fn teardown(&self, id: Uuid, user_id: &str) {
        self.sessions.write().await.remove(&id);
        self.fence.forget_prefix(&save_resource(id));
        self.fence.forget_prefix(&preview_resource(id));
        if let Err(e) = self
            .db
            .delete_setting(user_id, settings_keys::ONBOARDING_STORAGE)
            .await
        {
            warn!(session_id = %id, error = %e, "Failed to clear onboarding storage");
        }
        info!(session_id = %id, user_id, "Onboarding complete");
        self.events.publish(SessionEvent::SessionClosed {
            session_id: id,
            completed: true,
        });
    }
}

async fn live_session_for(
    sessions: &HashMap<Uuid, SharedSession>,
    user_id: &str,
) -> Option<SessionSnapshot> {
    for session in sessions.values() {
        let guard = session.read().await;
        if guard.user_id() == user_id {
            debug!(session_id = %guard.id(), user_id, "Resuming live session");
            return Some(guard.snapshot());
        }
    }
    None
}
