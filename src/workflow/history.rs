//! Bounded linear undo/redo over whole-graph snapshots.

use std::collections::VecDeque;

use super::model::WorkflowGraph;

/// Default number of snapshots kept on each stack.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Undo and redo stacks of `WorkflowGraph` snapshots.
///
/// Pushing a new undo entry clears the redo stack; there is no branching.
#[derive(Debug, Clone)]
pub struct HistoryStack {
    undo: VecDeque<WorkflowGraph>,
    redo: VecDeque<WorkflowGraph>,
    limit: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryStack {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Record the pre-edit state of a new edit.
    pub fn push(&mut self, snapshot: WorkflowGraph) {
        push_bounded(&mut self.undo, snapshot, self.limit);
        self.redo.clear();
    }

    /// Step back. Returns the snapshot to install, or `None` if there is
    /// nothing to undo.
    pub fn undo(&mut self, current: &WorkflowGraph) -> Option<WorkflowGraph> {
        let previous = self.undo.pop_back()?;
        push_bounded(&mut self.redo, current.clone(), self.limit);
        Some(previous)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: &WorkflowGraph) -> Option<WorkflowGraph> {
        let next = self.redo.pop_back()?;
        push_bounded(&mut self.undo, current.clone(), self.limit);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

/// Push onto the back, evicting from the front once over `limit`.
fn push_bounded(stack: &mut VecDeque<WorkflowGraph>, snapshot: WorkflowGraph, limit: usize) {
    stack.push_back(snapshot);
    while stack.len() > limit {
        stack.pop_front();
    }
}
