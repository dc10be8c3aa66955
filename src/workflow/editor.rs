//! Editor (canvas) projection of a workflow.
//!
//! The canvas always shows exactly one start and one end node. Those anchors
//! are added when projecting a normalized graph and stripped again when the
//! canvas state is written back.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::model::{
    is_anchor_id, Edge, Node, Position, StepType, WorkflowGraph, END_NODE_ID, START_NODE_ID,
};
use super::preview::{STEP_COLUMN_X, STEP_SPACING_Y};
use crate::error::WorkflowError;

/// Node and edge arrays as the visual editor holds them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl EditorGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Project a normalized graph onto the canvas, adding the anchors.
    ///
    /// The start anchor sits at the top of the step column, the end anchor
    /// one spacing below the lowest step.
    pub fn from_workflow(graph: &WorkflowGraph) -> Self {
        let end_y = graph
            .lowest_position()
            .map(|p| p.y + STEP_SPACING_Y)
            .unwrap_or(STEP_SPACING_Y);

        let mut nodes = Vec::with_capacity(graph.nodes.len() + 2);
        nodes.push(Node::new(
            START_NODE_ID,
            StepType::Start,
            Position::new(STEP_COLUMN_X, 0.0),
        ));
        nodes.extend(graph.nodes.iter().cloned());
        nodes.push(Node::new(
            END_NODE_ID,
            StepType::End,
            Position::new(STEP_COLUMN_X, end_y),
        ));

        Self {
            nodes,
            edges: graph.edges.clone(),
        }
    }

    /// Strip the anchors and return the normalized graph.
    ///
    /// Edges whose endpoints are neither a remaining step nor an anchor id
    /// are dropped.
    pub fn to_workflow(&self) -> WorkflowGraph {
        let nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| !n.is_anchor() && !is_anchor_id(&n.id))
            .cloned()
            .collect();
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let known = |id: &str| is_anchor_id(id) || ids.contains(id);
        let edges = self
            .edges
            .iter()
            .filter(|e| known(&e.source) && known(&e.target))
            .cloned()
            .collect();
        WorkflowGraph::new(nodes, edges)
    }

    /// Check canvas invariants: one start, one end, no dangling edges.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for anchor in [StepType::Start, StepType::End] {
            let count = self.nodes.iter().filter(|n| n.step_type == anchor).count();
            if count != 1 {
                return Err(WorkflowError::AnchorCount {
                    step_type: anchor.to_string(),
                    count,
                });
            }
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Delete a multi-selection of nodes, cascading to their edges.
    ///
    /// Anchors are kept even when selected. Returns the ids actually removed.
    pub fn remove_nodes(&mut self, ids: &[String]) -> Vec<String> {
        let selected: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let doomed: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| selected.contains(n.id.as_str()) && !n.is_anchor())
            .map(|n| n.id.clone())
            .collect();
        if doomed.is_empty() {
            return doomed;
        }

        self.nodes.retain(|n| !doomed.contains(&n.id));
        self.edges
            .retain(|e| !doomed.iter().any(|id| e.touches(id)));
        doomed
    }
}

/// Structural fingerprint compared by the synchronizer.
///
/// Covers id/type/position for nodes and id/source/target for edges; node
/// `data` is deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn of(graph: &WorkflowGraph) -> Self {
        let nodes: Vec<String> = graph
            .nodes
            .iter()
            .map(|n| format!("{}|{}|{},{}", n.id, n.step_type, n.position.x, n.position.y))
            .collect();
        let edges: Vec<String> = graph
            .edges
            .iter()
            .map(|e| format!("{}|{}|{}", e.id, e.source, e.target))
            .collect();
        Self(format!("{}#{}", nodes.join(";"), edges.join(";")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
