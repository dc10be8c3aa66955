//! Per-flow onboarding session.
//!
//! An `OnboardingSession` is created when a user starts onboarding and torn
//! down when it completes. It owns the normalized workflow (the "store"
//! side), the editor arrays, the preview list, the undo/redo history and the
//! synchronizer, plus the wizard selections that get persisted.
//!
//! All graph edits funnel through [`OnboardingSession::apply_editor_change`]
//! or the direct-edit operations, which push exactly one pre-edit snapshot
//! through the synchronizer. Store-side replacements (undo, redo, seeding,
//! external updates) go the other way through `refresh_editor`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{CampaignDataType, ChatMessage, ChatRole, OutreachChannel, PersistedOnboarding};
use super::state::OnboardingPhase;
use crate::error::{SessionError, WorkflowError};
use crate::workflow::palette::{self, DropEvent, Placement};
use crate::workflow::preview::resolve_workflow;
use crate::workflow::{
    EditOrigin, EditorGraph, HistoryCommand, HistoryStack, KeyPress, PreviewStep, SkipReason,
    StepType, SyncDecision, SyncPhase, Synchronizer, WorkflowGraph, seed_graph,
};

/// Result of an edit offered to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The workflow changed.
    Applied { generation: u64 },
    /// Nothing to propagate.
    Skipped(SkipReason),
    /// Refused; the message is meant for a warning toast.
    Rejected { message: String },
    /// Payload not understood; dropped without feedback.
    Ignored,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Skipped(SkipReason::Busy(_)) => "busy",
            Self::Skipped(SkipReason::Unchanged) => "unchanged",
            Self::Skipped(SkipReason::EmptyOverwrite) => "empty_overwrite",
            Self::Rejected { .. } => "rejected",
            Self::Ignored => "ignored",
        }
    }
}

/// Serializable view of a session for REST and WebSocket clients.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub user_id: String,
    pub phase: OnboardingPhase,
    pub workflow: WorkflowGraph,
    pub editor: EditorGraph,
    pub preview: Vec<PreviewStep>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_depth: usize,
    pub redo_depth: usize,
    pub sync: SyncPhase,
    pub generation: u64,
    pub channels: Vec<OutreachChannel>,
    pub selected_platforms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_data_type: Option<CampaignDataType>,
    pub ai_chat: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}

/// Wizard selections; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SelectionUpdate {
    #[serde(default)]
    pub channels: Option<Vec<OutreachChannel>>,
    #[serde(default)]
    pub selected_platforms: Option<Vec<String>>,
    #[serde(default)]
    pub campaign_data_type: Option<CampaignDataType>,
}

pub struct OnboardingSession {
    id: Uuid,
    user_id: String,
    phase: OnboardingPhase,
    workflow: WorkflowGraph,
    editor: EditorGraph,
    preview: Vec<PreviewStep>,
    history: HistoryStack,
    sync: Synchronizer,
    channels: Vec<OutreachChannel>,
    selected_platforms: Vec<String>,
    ai_chat: Vec<ChatMessage>,
    campaign_data_type: Option<CampaignDataType>,
    updated_at: DateTime<Utc>,
}

impl OnboardingSession {
    pub fn new(user_id: impl Into<String>, history_limit: usize) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            phase: OnboardingPhase::NotStarted,
            workflow: WorkflowGraph::default(),
            editor: EditorGraph::default(),
            preview: Vec::new(),
            history: HistoryStack::new(history_limit),
            sync: Synchronizer::new(),
            channels: Vec::new(),
            selected_platforms: Vec::new(),
            ai_chat: Vec::new(),
            campaign_data_type: None,
            updated_at: Utc::now(),
        };
        session.refresh_editor();
        session
    }

    /// Rebuild a session from its persisted subset.
    pub fn restore(
        user_id: impl Into<String>,
        persisted: PersistedOnboarding,
        history_limit: usize,
    ) -> Self {
        let mut session = Self::new(user_id, history_limit);
        session.workflow = persisted.workflow.unwrap_or_default();
        session.channels = persisted.channels;
        session.selected_platforms = persisted.selected_platforms;
        session.ai_chat = persisted.ai_chat;
        session.campaign_data_type = persisted.campaign_data_type;
        session.refresh_editor();
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn phase(&self) -> OnboardingPhase {
        self.phase
    }

    pub fn workflow(&self) -> &WorkflowGraph {
        &self.workflow
    }

    pub fn editor(&self) -> &EditorGraph {
        &self.editor
    }

    pub fn preview(&self) -> &[PreviewStep] {
        &self.preview
    }

    pub fn campaign_data_type(&self) -> Option<CampaignDataType> {
        self.campaign_data_type
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn generation(&self) -> u64 {
        self.sync.generation()
    }

    // ── Editor → store ──────────────────────────────────────────────

    /// Accept the editor's arrays as pushed by the canvas.
    pub fn apply_editor_change(&mut self, editor: EditorGraph) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        editor.to_workflow().validate()?;
        Ok(self.commit(editor, EditOrigin::Canvas))
    }

    /// Connect two nodes (either may be an anchor).
    pub fn connect(&mut self, source: &str, target: &str) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        let mut next = self.workflow.clone();
        if !next.connect(source, target)? {
            return Ok(EditOutcome::Skipped(SkipReason::Unchanged));
        }
        let editor = self.project(&next);
        Ok(self.commit(editor, EditOrigin::Direct))
    }

    /// Delete a multi-selection of nodes. Anchors in the selection survive.
    pub fn delete_nodes(&mut self, ids: &[String]) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        let mut editor = self.editor.clone();
        let removed = editor.remove_nodes(ids);
        if removed.is_empty() {
            return Ok(EditOutcome::Skipped(SkipReason::Unchanged));
        }
        self.preview.retain(|s| !removed.contains(&s.id));
        debug!(session_id = %self.id, removed = ?removed, "Deleting nodes");
        Ok(self.commit(editor, EditOrigin::Direct))
    }

    /// Place a palette item dropped on the canvas.
    pub fn drop_node(&mut self, event: &DropEvent) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        match palette::place_drop(&self.workflow, event) {
            Placement::Ignored => Ok(EditOutcome::Ignored),
            Placement::Duplicate(step_type) => Ok(EditOutcome::Rejected {
                message: palette::duplicate_message(step_type),
            }),
            Placement::Placed(node) => {
                debug!(session_id = %self.id, node_id = %node.id, "Dropped node");
                let mut next = self.workflow.clone();
                next.nodes.push(node);
                let editor = self.project(&next);
                Ok(self.commit(editor, EditOrigin::Direct))
            }
        }
    }

    /// Add a palette item by clicking it: appended to the preview list and
    /// chained before the end anchor.
    pub fn click_palette_item(&mut self, step_type: StepType) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        match palette::place_click(&self.workflow, step_type) {
            Placement::Ignored => Ok(EditOutcome::Ignored),
            Placement::Duplicate(step_type) => Ok(EditOutcome::Rejected {
                message: palette::duplicate_message(step_type),
            }),
            Placement::Placed(node) => {
                self.preview.push(PreviewStep::new(&node.id, node.step_type));
                let mut next = self.workflow.clone();
                next.append_step(node);
                let editor = self.project(&next);
                Ok(self.commit(editor, EditOrigin::Direct))
            }
        }
    }

    /// Shallow-merge `data` into a step's payload.
    ///
    /// Data is not part of the content key, so this bypasses the
    /// synchronizer and records its own history entry.
    pub fn update_node_data(
        &mut self,
        node_id: &str,
        data: serde_json::Value,
    ) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        let serde_json::Value::Object(patch) = data else {
            return Err(SessionError::InvalidRequest(
                "node data must be a JSON object".to_string(),
            ));
        };
        let Some(current) = self.workflow.node(node_id) else {
            return Err(WorkflowError::NodeNotFound {
                id: node_id.to_string(),
            }
            .into());
        };

        let mut merged = current.data.clone();
        if !merged.is_object() {
            merged = serde_json::json!({});
        }
        if let Some(obj) = merged.as_object_mut() {
            for (key, value) in patch {
                obj.insert(key, value);
            }
        }
        if merged == current.data {
            return Ok(EditOutcome::Skipped(SkipReason::Unchanged));
        }

        self.history.push(self.workflow.clone());
        if let Some(node) = self.workflow.node_mut(node_id) {
            node.data = merged.clone();
        }
        if let Some(node) = self.editor.nodes.iter_mut().find(|n| n.id == node_id) {
            node.data = merged;
        }
        self.touch();
        Ok(EditOutcome::Applied {
            generation: self.sync.generation(),
        })
    }

    // ── Store → editor ──────────────────────────────────────────────

    /// Step back one edit. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let Some(previous) = self.history.undo(&self.workflow) else {
            return Ok(false);
        };
        self.workflow = previous;
        self.refresh_editor();
        self.touch();
        Ok(true)
    }

    /// Re-apply an undone edit. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool, SessionError> {
        self.ensure_editable()?;
        let Some(next) = self.history.redo(&self.workflow) else {
            return Ok(false);
        };
        self.workflow = next;
        self.refresh_editor();
        self.touch();
        Ok(true)
    }

    /// Run the history command bound to a key press, if it is enabled.
    pub fn handle_shortcut(&mut self, key: &KeyPress) -> Result<Option<HistoryCommand>, SessionError> {
        let Some(command) = key.command() else {
            return Ok(None);
        };
        let ran = match command {
            HistoryCommand::Undo if self.can_undo() => self.undo()?,
            HistoryCommand::Redo if self.can_redo() => self.redo()?,
            _ => false,
        };
        Ok(ran.then_some(command))
    }

    /// Replace the preview list and re-seed the workflow from it.
    pub fn seed_from_preview(&mut self, steps: Vec<PreviewStep>) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        let graph = seed_graph(&steps);
        self.preview = steps;
        Ok(self.replace_workflow(graph))
    }

    /// Take a preview list fetched from the backend.
    ///
    /// The workflow is only derived from it when the session has none yet.
    pub fn accept_preview(&mut self, steps: Vec<PreviewStep>) -> EditOutcome {
        self.preview = steps;
        if !self.phase.allows_editing() {
            return EditOutcome::Skipped(SkipReason::Unchanged);
        }
        let graph = resolve_workflow(Some(&self.workflow), &self.preview);
        self.replace_workflow(graph)
    }

    /// Install a workflow that arrived from outside the editor.
    pub fn replace_from_external(&mut self, graph: WorkflowGraph) -> Result<EditOutcome, SessionError> {
        self.ensure_editable()?;
        graph.validate()?;
        Ok(self.replace_workflow(graph))
    }

    // ── Wizard state ────────────────────────────────────────────────

    pub fn set_selections(&mut self, update: SelectionUpdate) {
        if let Some(channels) = update.channels {
            self.channels = channels;
        }
        if let Some(platforms) = update.selected_platforms {
            self.selected_platforms = platforms;
        }
        if update.campaign_data_type.is_some() {
            self.campaign_data_type = update.campaign_data_type;
        }
        self.touch();
    }

    pub fn push_chat_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.ai_chat.push(ChatMessage::new(role, content));
        self.touch();
    }

    /// Move the wizard to its next phase.
    pub fn advance(&mut self) -> Result<OnboardingPhase, SessionError> {
        let next = self.phase.next().ok_or_else(|| SessionError::InvalidTransition {
            id: self.id,
            phase: self.phase.to_string(),
            target: "next".to_string(),
        })?;
        if !self.phase.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                id: self.id,
                phase: self.phase.to_string(),
                target: next.to_string(),
            });
        }
        info!(session_id = %self.id, from = %self.phase, to = %next, "Onboarding phase advanced");
        self.phase = next;
        self.touch();
        Ok(next)
    }

    /// Clear everything back to a fresh, not-started session.
    pub fn reset(&mut self) {
        info!(session_id = %self.id, "Resetting onboarding session");
        self.phase = OnboardingPhase::NotStarted;
        self.workflow = WorkflowGraph::default();
        self.preview.clear();
        self.history.clear();
        self.sync.reset();
        self.channels.clear();
        self.selected_platforms.clear();
        self.ai_chat.clear();
        self.campaign_data_type = None;
        self.refresh_editor();
        self.touch();
    }

    /// The subset of fields that survives a reload.
    pub fn persisted(&self) -> PersistedOnboarding {
        PersistedOnboarding {
            workflow: (!self.workflow.is_empty()).then(|| self.workflow.clone()),
            channels: self.channels.clone(),
            selected_platforms: self.selected_platforms.clone(),
            ai_chat: self.ai_chat.clone(),
            campaign_data_type: self.campaign_data_type,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            user_id: self.user_id.clone(),
            phase: self.phase,
            workflow: self.workflow.clone(),
            editor: self.editor.clone(),
            preview: self.preview.clone(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            undo_depth: self.history.undo_len(),
            redo_depth: self.history.redo_len(),
            sync: self.sync.phase(),
            generation: self.sync.generation(),
            channels: self.channels.clone(),
            selected_platforms: self.selected_platforms.clone(),
            campaign_data_type: self.campaign_data_type,
            ai_chat: self.ai_chat.clone(),
            updated_at: self.updated_at,
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn ensure_editable(&self) -> Result<(), SessionError> {
        if self.phase.allows_editing() {
            Ok(())
        } else {
            Err(SessionError::InvalidRequest(format!(
                "session {} is {}, workflow is read-only",
                self.id, self.phase
            )))
        }
    }

    /// Offer editor arrays to the synchronizer and, if they propagate,
    /// record the pre-image and write the store.
    fn commit(&mut self, editor: EditorGraph, origin: EditOrigin) -> EditOutcome {
        match self.sync.on_editor_change(&editor, &self.workflow, origin) {
            SyncDecision::Propagate(commit) => {
                let previous = std::mem::replace(&mut self.workflow, commit.graph);
                self.history.push(previous);
                self.editor = if editor.validate().is_ok() {
                    editor
                } else {
                    self.project(&self.workflow)
                };
                self.sync.complete(commit.generation);
                self.touch();
                EditOutcome::Applied {
                    generation: commit.generation,
                }
            }
            SyncDecision::Skip(reason) => EditOutcome::Skipped(reason),
        }
    }

    /// Install a store-side graph, recording the current one for undo.
    fn replace_workflow(&mut self, graph: WorkflowGraph) -> EditOutcome {
        if graph == self.workflow {
            return EditOutcome::Skipped(SkipReason::Unchanged);
        }
        let previous = std::mem::replace(&mut self.workflow, graph);
        if !previous.is_empty() {
            self.history.push(previous);
        }
        self.touch();
        match self.refresh_editor() {
            Some(generation) => EditOutcome::Applied { generation },
            None => EditOutcome::Applied {
                generation: self.sync.generation(),
            },
        }
    }

    /// Push the store graph into the editor arrays.
    fn refresh_editor(&mut self) -> Option<u64> {
        match self.sync.on_store_change(&self.workflow) {
            SyncDecision::Propagate(apply) => {
                self.editor = apply.editor;
                self.sync.complete(apply.generation);
                Some(apply.generation)
            }
            SyncDecision::Skip(SkipReason::Unchanged) => {
                // Same structure; node data may still differ (data-only undo).
                for node in self.editor.nodes.iter_mut() {
                    if let Some(source) = self.workflow.node(&node.id) {
                        node.data = source.data.clone();
                    }
                }
                None
            }
            SyncDecision::Skip(reason) => {
                debug!(session_id = %self.id, ?reason, "Editor refresh skipped");
                None
            }
        }
    }

    /// Editor projection of `graph`, keeping the canvas's current anchors.
    fn project(&self, graph: &WorkflowGraph) -> EditorGraph {
        let mut editor = EditorGraph::from_workflow(graph);
        for slot in editor.nodes.iter_mut().filter(|n| n.is_anchor()) {
            if let Some(current) = self.editor.nodes.iter().find(|n| n.id == slot.id && n.is_anchor()) {
                *slot = current.clone();
            }
        }
        editor
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
