//! Error types for outreach-flow.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Structural violations of a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Duplicate node id: {id}")]
    DuplicateNode { id: String },

    #[error("Duplicate edge id: {id}")]
    DuplicateEdge { id: String },

    #[error("Node {id} not found")]
    NodeNotFound { id: String },

    #[error("Edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Expected exactly one {step_type} node, found {count}")]
    AnchorCount { step_type: String, count: usize },

    #[error("Anchor node {id} is not allowed in a normalized workflow")]
    AnchorInWorkflow { id: String },

    #[error("Cannot connect {source_id} to itself")]
    SelfLoop { source_id: String },

    #[error("Edge from {source_id} to {target_id} is not allowed")]
    InvalidConnection { source_id: String, target_id: String },
}

/// Onboarding session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: Uuid },

    #[error("Session {id} is in phase {phase}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        phase: String,
        target: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Errors from the remote workflow backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend is not configured")]
    Disabled,

    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Backend returned {status} for {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
