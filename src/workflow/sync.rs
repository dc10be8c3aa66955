//! Editor ↔ store synchronizer.
//!
//! Keeps the canvas arrays and the normalized workflow consistent in both
//! directions without feedback loops. Instead of a boolean flag reset on a
//! timer, the synchronizer is a three-state machine:
//!
//! ```text
//!            on_store_change                 complete(gen)
//!   Idle ───────────────────▶ ApplyingFromStore(gen) ─────────▶ Idle
//!     │
//!     │      on_editor_change                complete(gen)
//!     └─────────────────────▶ ApplyingFromEditor(gen) ────────▶ Idle
//! ```
//!
//! Each propagation gets a fresh generation number. Only `complete` with the
//! matching generation returns the machine to `Idle`; anything else is a
//! stale acknowledgement and is ignored. While a propagation is in flight,
//! changes arriving from either side are skipped, so at most one direction
//! propagates per change cycle.

use serde::Serialize;
use tracing::debug;

use super::editor::{ContentKey, EditorGraph};
use super::model::WorkflowGraph;

/// Current state of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    ApplyingFromStore { generation: u64 },
    ApplyingFromEditor { generation: u64 },
}

impl SyncPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    fn generation(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::ApplyingFromStore { generation } | Self::ApplyingFromEditor { generation } => {
                Some(*generation)
            }
        }
    }
}

/// Where an editor-side change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Raw canvas state pushed by the client; may be a partial render.
    Canvas,
    /// A session operation (connect, delete, drop, ...) known to be intentional.
    Direct,
}

/// Why a change was not propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another propagation is still in flight.
    Busy(SyncPhase),
    /// Content key matches what was last applied.
    Unchanged,
    /// A canvas update with empty arrays would overwrite a non-empty graph.
    EmptyOverwrite,
}

/// Outcome of offering a change to the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision<T> {
    Propagate(T),
    Skip(SkipReason),
}

impl<T> SyncDecision<T> {
    pub fn is_propagate(&self) -> bool {
        matches!(self, Self::Propagate(_))
    }
}

/// Canvas arrays to install after a store-side change.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreApply {
    pub generation: u64,
    pub editor: EditorGraph,
}

/// Normalized graph to write after an editor-side change.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorCommit {
    pub generation: u64,
    pub graph: WorkflowGraph,
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    phase: SyncPhase,
    generation: u64,
    last_applied: Option<ContentKey>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synchronizer {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            generation: 0,
            last_applied: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Generation of the most recent propagation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The store's graph changed (undo, redo, external update).
    pub fn on_store_change(&mut self, store: &WorkflowGraph) -> SyncDecision<StoreApply> {
        if !self.phase.is_idle() {
            debug!(phase = ?self.phase, "Store change suppressed while propagating");
            return SyncDecision::Skip(SkipReason::Busy(self.phase));
        }

        let key = ContentKey::of(store);
        if self.last_applied.as_ref() == Some(&key) {
            return SyncDecision::Skip(SkipReason::Unchanged);
        }

        let generation = self.begin();
        self.phase = SyncPhase::ApplyingFromStore { generation };
        self.last_applied = Some(key);
        debug!(generation, "Propagating store change to editor");

        SyncDecision::Propagate(StoreApply {
            generation,
            editor: EditorGraph::from_workflow(store),
        })
    }

    /// The editor's arrays changed.
    pub fn on_editor_change(
        &mut self,
        editor: &EditorGraph,
        store: &WorkflowGraph,
        origin: EditOrigin,
    ) -> SyncDecision<EditorCommit> {
        if !self.phase.is_idle() {
            debug!(phase = ?self.phase, "Editor change suppressed while propagating");
            return SyncDecision::Skip(SkipReason::Busy(self.phase));
        }

        let graph = editor.to_workflow();
        if origin == EditOrigin::Canvas
            && (graph.nodes.is_empty() || graph.edges.is_empty())
            && !store.is_empty()
        {
            debug!(
                nodes = graph.nodes.len(),
                edges = graph.edges.len(),
                "Ignoring empty canvas update over non-empty workflow"
            );
            return SyncDecision::Skip(SkipReason::EmptyOverwrite);
        }

        let key = ContentKey::of(&graph);
        if self.last_applied.as_ref() == Some(&key) {
            return SyncDecision::Skip(SkipReason::Unchanged);
        }

        let generation = self.begin();
        self.phase = SyncPhase::ApplyingFromEditor { generation };
        self.last_applied = Some(key);
        debug!(generation, ?origin, "Propagating editor change to store");

        SyncDecision::Propagate(EditorCommit { generation, graph })
    }

    /// Acknowledge that the propagation with `generation` has been applied.
    ///
    /// Returns `false` for a stale or unexpected acknowledgement.
    pub fn complete(&mut self, generation: u64) -> bool {
        if self.phase.generation() == Some(generation) {
            self.phase = SyncPhase::Idle;
            true
        } else {
            debug!(
                generation,
                phase = ?self.phase,
                "Ignoring stale sync completion"
            );
            false
        }
    }

    /// Forget the last applied content and return to idle.
    ///
    /// The generation counter keeps counting so acknowledgements issued
    /// before the reset stay stale.
    pub fn reset(&mut self) {
        self.phase = SyncPhase::Idle;
        self.last_applied = None;
    }

    fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}
