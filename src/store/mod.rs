//! Persistence layer — libSQL-backed storage for settings and saved workflows.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, SavedWorkflow};
