//! Workflow graph data model.
//!
//! The normalized `WorkflowGraph` holds only step nodes. The start and end
//! anchors exist implicitly: edges may point at the reserved ids
//! [`START_NODE_ID`] and [`END_NODE_ID`], and the editor projection
//! materializes them as real nodes (see `workflow::editor`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Reserved id of the synthetic start anchor.
pub const START_NODE_ID: &str = "start";
/// Reserved id of the synthetic end anchor.
pub const END_NODE_ID: &str = "end";

/// Kind of automation step a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Start,
    End,
    LinkedinConnect,
    LinkedinMessage,
    LinkedinProfileVisit,
    LinkedinLikePost,
    LinkedinInmail,
    EmailSend,
    EmailFollowUp,
    Delay,
}

impl StepType {
    /// Step types a user can add from the palette.
    pub const PALETTE: [StepType; 8] = [
        StepType::LinkedinConnect,
        StepType::LinkedinMessage,
        StepType::LinkedinProfileVisit,
        StepType::LinkedinLikePost,
        StepType::LinkedinInmail,
        StepType::EmailSend,
        StepType::EmailFollowUp,
        StepType::Delay,
    ];

    /// Whether this is one of the synthetic start/end anchors.
    pub fn is_anchor(&self) -> bool {
        matches!(self, Self::Start | Self::End)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::LinkedinConnect => "linkedin_connect",
            Self::LinkedinMessage => "linkedin_message",
            Self::LinkedinProfileVisit => "linkedin_profile_visit",
            Self::LinkedinLikePost => "linkedin_like_post",
            Self::LinkedinInmail => "linkedin_inmail",
            Self::EmailSend => "email_send",
            Self::EmailFollowUp => "email_follow_up",
            Self::Delay => "delay",
        }
    }

    /// Human-readable title shown on the node card.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::End => "End",
            Self::LinkedinConnect => "Send Connection Request",
            Self::LinkedinMessage => "Send LinkedIn Message",
            Self::LinkedinProfileVisit => "Visit Profile",
            Self::LinkedinLikePost => "Like Recent Post",
            Self::LinkedinInmail => "Send InMail",
            Self::EmailSend => "Send Email",
            Self::EmailFollowUp => "Send Follow-up Email",
            Self::Delay => "Wait",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Start => "Sequence starts here",
            Self::End => "Sequence ends here",
            Self::LinkedinConnect => "Send a personalized connection request",
            Self::LinkedinMessage => "Message a first-degree connection",
            Self::LinkedinProfileVisit => "View the lead's profile to warm them up",
            Self::LinkedinLikePost => "Engage with the lead's latest post",
            Self::LinkedinInmail => "Reach out without an existing connection",
            Self::EmailSend => "Send the first email of the sequence",
            Self::EmailFollowUp => "Follow up on a previous email",
            Self::Delay => "Pause before the next step",
        }
    }

    /// Default `data` payload for a freshly created node of this type.
    pub fn default_data(&self) -> serde_json::Value {
        let mut data = serde_json::json!({
            "title": self.title(),
            "description": self.description(),
        });
        let config = match self {
            Self::Delay => serde_json::json!({ "days": 1 }),
            Self::LinkedinConnect => serde_json::json!({ "note": "" }),
            Self::LinkedinMessage | Self::LinkedinInmail => serde_json::json!({ "message": "" }),
            Self::EmailSend | Self::EmailFollowUp => {
                serde_json::json!({ "subject": "", "body": "" })
            }
            _ => return data,
        };
        if let Some(obj) = data.as_object_mut() {
            obj.insert("config".to_string(), config);
        }
        data
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "linkedin_connect" => Ok(Self::LinkedinConnect),
            "linkedin_message" => Ok(Self::LinkedinMessage),
            "linkedin_profile_visit" => Ok(Self::LinkedinProfileVisit),
            "linkedin_like_post" => Ok(Self::LinkedinLikePost),
            "linkedin_inmail" => Ok(Self::LinkedinInmail),
            "email_send" => Ok(Self::EmailSend),
            "email_follow_up" => Ok(Self::EmailFollowUp),
            "delay" => Ok(Self::Delay),
            _ => Err(format!("Unknown step type: {}", s)),
        }
    }
}

/// A point on the editor canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::ops::Sub for Position {
    type Output = Position;
    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A single step in the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub position: Position,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Node {
    /// Create a node carrying the default data for its step type.
    pub fn new(id: impl Into<String>, step_type: StepType, position: Position) -> Self {
        Self {
            id: id.into(),
            step_type,
            position,
            data: step_type.default_data(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn is_anchor(&self) -> bool {
        self.step_type.is_anchor()
    }
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    /// Edge with the conventional `e-{source}-{target}` id.
    pub fn between(source: &str, target: &str) -> Self {
        Self::new(format!("e-{source}-{target}"), source, target)
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Normalized workflow: step nodes plus the edges between them and the anchors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Whether `id` is one of the reserved anchor ids.
pub fn is_anchor_id(id: &str) -> bool {
    id == START_NODE_ID || id == END_NODE_ID
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn has_step_type(&self, step_type: StepType) -> bool {
        self.nodes.iter().any(|n| n.step_type == step_type)
    }

    /// An edge endpoint is valid if it is a step node or an anchor.
    fn is_endpoint(&self, id: &str) -> bool {
        is_anchor_id(id) || self.node(id).is_some()
    }

    /// Check the structural invariants of the normalized graph.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if node.is_anchor() || is_anchor_id(&node.id) {
                return Err(WorkflowError::AnchorInWorkflow {
                    id: node.id.clone(),
                });
            }
            if !node_ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }

        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(WorkflowError::DuplicateEdge {
                    id: edge.id.clone(),
                });
            }
            for endpoint in [&edge.source, &edge.target] {
                if !is_anchor_id(endpoint) && !node_ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
            check_direction(&edge.source, &edge.target)?;
        }
        Ok(())
    }

    /// Add an edge between two existing endpoints.
    ///
    /// Returns `Ok(false)` when an identical connection already exists.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<bool, WorkflowError> {
        if source == target {
            return Err(WorkflowError::SelfLoop {
                source_id: source.to_string(),
            });
        }
        for id in [source, target] {
            if !self.is_endpoint(id) {
                return Err(WorkflowError::NodeNotFound { id: id.to_string() });
            }
        }
        check_direction(source, target)?;

        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target)
        {
            return Ok(false);
        }

        let mut edge = Edge::between(source, target);
        if self.edges.iter().any(|e| e.id == edge.id) {
            edge.id = format!("{}-{}", edge.id, self.edges.len());
        }
        self.edges.push(edge);
        Ok(true)
    }

    /// Lowest point (largest `y`) among the step nodes.
    pub fn lowest_position(&self) -> Option<Position> {
        self.nodes
            .iter()
            .map(|n| n.position)
            .max_by(|a, b| a.y.total_cmp(&b.y))
    }

    /// Append a step at the tail of the sequence, just before the end anchor.
    ///
    /// Edges that pointed at the end anchor are re-targeted to the new node.
    pub fn append_step(&mut self, node: Node) {
        let new_id = node.id.clone();
        let mut predecessors: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.target == END_NODE_ID)
            .map(|e| e.source.clone())
            .collect();
        if predecessors.is_empty() {
            let tail = self
                .nodes
                .last()
                .map(|n| n.id.clone())
                .unwrap_or_else(|| START_NODE_ID.to_string());
            predecessors.push(tail);
        }

        self.edges.retain(|e| e.target != END_NODE_ID);
        self.nodes.push(node);
        for source in predecessors {
            self.edges.push(Edge::between(&source, &new_id));
        }
        self.edges.push(Edge::between(&new_id, END_NODE_ID));
    }
}

/// Nothing flows into start and nothing flows out of end.
fn check_direction(source: &str, target: &str) -> Result<(), WorkflowError> {
    if source == END_NODE_ID || target == START_NODE_ID {
        return Err(WorkflowError::InvalidConnection {
            source_id: source.to_string(),
            target_id: target.to_string(),
        });
    }
    Ok(())
}
