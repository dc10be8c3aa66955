//! Palette drag/drop and click placement.

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use super::model::{Node, Position, StepType, WorkflowGraph};
use super::preview::{seeded_position, STEP_SPACING_Y};

/// Subtracted from the drop point so the node centers under the cursor.
pub const DROP_OFFSET: Position = Position { x: 75.0, y: 25.0 };

const ID_SUFFIX_LEN: usize = 9;

/// A palette item released over the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEvent {
    /// Step type carried by the drag payload; may be missing or garbage.
    #[serde(default)]
    pub payload: Option<String>,
    /// Cursor position at release, in client coordinates.
    pub cursor: Position,
    /// Top-left corner of the canvas, in client coordinates.
    #[serde(default)]
    pub canvas_origin: Position,
}

impl DropEvent {
    /// The step type to create, if the payload names a palette step.
    pub fn step_type(&self) -> Option<StepType> {
        let raw = self.payload.as_deref()?.trim();
        let step_type: StepType = raw.parse().ok()?;
        (!step_type.is_anchor()).then_some(step_type)
    }

    /// Canvas position for the new node.
    pub fn canvas_position(&self) -> Position {
        self.cursor - self.canvas_origin - DROP_OFFSET
    }
}

/// Result of trying to place a palette item.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Placed(Node),
    /// The step type is already part of the workflow.
    Duplicate(StepType),
    /// Payload missing or not a palette step.
    Ignored,
}

/// Unique node id: step type, millisecond timestamp and a random suffix.
pub fn generate_node_id(step_type: StepType) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}-{}-{}", step_type, Utc::now().timestamp_millis(), suffix)
}

/// Place a dropped palette item.
pub fn place_drop(graph: &WorkflowGraph, event: &DropEvent) -> Placement {
    let Some(step_type) = event.step_type() else {
        return Placement::Ignored;
    };
    if graph.has_step_type(step_type) {
        return Placement::Duplicate(step_type);
    }
    Placement::Placed(Node::new(
        generate_node_id(step_type),
        step_type,
        event.canvas_position(),
    ))
}

/// Place a clicked palette item below the current lowest step.
pub fn place_click(graph: &WorkflowGraph, step_type: StepType) -> Placement {
    if step_type.is_anchor() {
        return Placement::Ignored;
    }
    if graph.has_step_type(step_type) {
        return Placement::Duplicate(step_type);
    }
    let position = graph
        .lowest_position()
        .map(|p| p.offset(0.0, STEP_SPACING_Y))
        .unwrap_or_else(|| seeded_position(0));
    Placement::Placed(Node::new(generate_node_id(step_type), step_type, position))
}

/// Toast text for a rejected duplicate.
pub fn duplicate_message(step_type: StepType) -> String {
    format!("\"{}\" is already part of this workflow", step_type.title())
}
