//! Workflow graph core — model, editor projection, history, synchronizer
//! and palette placement.
//!
//! Everything in here is synchronous and free of I/O; the onboarding
//! session composes these pieces and the manager adds persistence.

pub mod editor;
pub mod history;
pub mod model;
pub mod palette;
pub mod preview;
pub mod shortcuts;
pub mod sync;

pub use editor::{ContentKey, EditorGraph};
pub use history::{HistoryStack, DEFAULT_HISTORY_LIMIT};
pub use model::{Edge, Node, Position, StepType, WorkflowGraph, END_NODE_ID, START_NODE_ID};
pub use palette::{DropEvent, Placement};
pub use preview::{seed_graph, PreviewStep};
pub use shortcuts::{HistoryCommand, KeyPress};
pub use sync::{EditOrigin, SkipReason, SyncDecision, SyncPhase, Synchronizer};
