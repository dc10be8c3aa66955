//! Preview step lists and linear seeding.
//!
//! A preview is the flat list of steps suggested for a campaign before the
//! user opens the visual editor. Seeding turns it into a graph with one node
//! per step, chained `start → s1 → … → sN → end`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::model::{
    is_anchor_id, Edge, Node, Position, StepType, WorkflowGraph, END_NODE_ID, START_NODE_ID,
};

/// Horizontal canvas column all seeded steps share.
pub const STEP_COLUMN_X: f64 = 250.0;
/// Vertical distance between consecutive seeded steps.
pub const STEP_SPACING_Y: f64 = 150.0;

/// One entry of a preview list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl PreviewStep {
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            step_type,
            title: None,
            description: None,
            config: None,
        }
    }

    /// Node data: step defaults overridden by whatever the preview supplies.
    fn node_data(&self) -> serde_json::Value {
        let mut data = self.step_type.default_data();
        if let Some(obj) = data.as_object_mut() {
            if let Some(ref title) = self.title {
                obj.insert("title".to_string(), serde_json::json!(title));
            }
            if let Some(ref description) = self.description {
                obj.insert("description".to_string(), serde_json::json!(description));
            }
            if let Some(ref config) = self.config {
                obj.insert("config".to_string(), config.clone());
            }
        }
        data
    }
}

/// Canvas position of the `index`-th seeded step (0-based).
pub fn seeded_position(index: usize) -> Position {
    Position::new(STEP_COLUMN_X, STEP_SPACING_Y * (index as f64 + 1.0))
}

/// Build a linear workflow from a preview list.
///
/// Anchor-typed entries, entries reusing an anchor id and repeated ids are
/// skipped.
pub fn seed_graph(steps: &[PreviewStep]) -> WorkflowGraph {
    let mut seen = HashSet::new();
    let usable: Vec<&PreviewStep> = steps
        .iter()
        .filter(|s| !s.step_type.is_anchor() && !is_anchor_id(&s.id))
        .filter(|s| seen.insert(s.id.as_str()))
        .collect();

    if usable.is_empty() {
        return WorkflowGraph::default();
    }

    let nodes: Vec<Node> = usable
        .iter()
        .enumerate()
        .map(|(i, s)| Node::new(&s.id, s.step_type, seeded_position(i)).with_data(s.node_data()))
        .collect();

    let mut chain: Vec<&str> = Vec::with_capacity(nodes.len() + 2);
    chain.push(START_NODE_ID);
    chain.extend(nodes.iter().map(|n| n.id.as_str()));
    chain.push(END_NODE_ID);
    let edges = chain
        .windows(2)
        .map(|pair| Edge::between(pair[0], pair[1]))
        .collect();

    WorkflowGraph::new(nodes, edges)
}

/// Use the stored workflow when it has content, otherwise derive one from
/// the preview list.
pub fn resolve_workflow(stored: Option<&WorkflowGraph>, preview: &[PreviewStep]) -> WorkflowGraph {
    match stored {
        Some(graph) if !graph.nodes.is_empty() => graph.clone(),
        _ => seed_graph(preview),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> Vec<PreviewStep> {
        vec![
            PreviewStep::new("s1", StepType::LinkedinConnect),
            PreviewStep::new("s2", StepType::EmailSend),
        ]
    }

    #[test]
    fn seeds_linear_chain() {
        let graph = seed_graph(&preview());
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);

        let pairs: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![(START_NODE_ID, "s1"), ("s1", "s2"), ("s2", END_NODE_ID)]
        );
        graph.validate().unwrap();
    }

    #[test]
    fn seeded_positions_descend() {
        let graph = seed_graph(&preview());
        assert_eq!(graph.nodes[0].position, Position::new(STEP_COLUMN_X, 150.0));
        assert_eq!(graph.nodes[1].position, Position::new(STEP_COLUMN_X, 300.0));
    }

    #[test]
    fn preview_overrides_default_data() {
        let mut step = PreviewStep::new("s1", StepType::Delay);
        step.title = Some("Wait 3 days".to_string());
        step.config = Some(serde_json::json!({ "days": 3 }));

        let graph = seed_graph(&[step]);
        assert_eq!(graph.nodes[0].data["title"], "Wait 3 days");
        assert_eq!(graph.nodes[0].data["config"]["days"], 3);
        assert_eq!(graph.nodes[0].data["description"], StepType::Delay.description());
    }

    #[test]
    fn skips_anchors_and_repeated_ids() {
        let steps = vec![
            PreviewStep::new("start", StepType::Start),
            PreviewStep::new("s1", StepType::EmailSend),
            PreviewStep::new("s1", StepType::Delay),
        ];
        let graph = seed_graph(&steps);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].step_type, StepType::EmailSend);
    }

    #[test]
    fn steps_reusing_anchor_ids_are_skipped() {
        let steps = vec![
            PreviewStep::new(END_NODE_ID, StepType::Delay),
            PreviewStep::new(START_NODE_ID, StepType::EmailSend),
            PreviewStep::new("s2", StepType::EmailSend),
        ];
        let graph = seed_graph(&steps);
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["s2"]);
        graph.validate().unwrap();
    }

    #[test]
    fn empty_preview_yields_empty_graph() {
        assert!(seed_graph(&[]).is_empty());
    }

    #[test]
    fn resolve_prefers_stored_content() {
        let stored = seed_graph(&[PreviewStep::new("x", StepType::Delay)]);
        assert_eq!(resolve_workflow(Some(&stored), &preview()), stored);
        assert_eq!(
            resolve_workflow(Some(&WorkflowGraph::default()), &preview()),
            seed_graph(&preview())
        );
        assert_eq!(resolve_workflow(None, &preview()), seed_graph(&preview()));
    }

    #[test]
    fn preview_step_wire_format() {
        let step: PreviewStep =
            serde_json::from_str(r#"{"id":"s1","type":"linkedin_connect"}"#).unwrap();
        assert_eq!(step, PreviewStep::new("s1", StepType::LinkedinConnect));
    }
}
