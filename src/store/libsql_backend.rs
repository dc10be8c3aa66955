//! libSQL implementation of [`Database`] for onboarding state and the
//! saved-workflow audit trail.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, SavedWorkflow};
use crate::workflow::WorkflowGraph;

/// Settings and saved-workflow storage on one shared libSQL connection.
pub struct LibSqlBackend {
    // Keeps the database handle alive for the connection's lifetime.
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) the database file at `path`, creating parent
    /// directories as needed, and bring the schema up to date.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("create {}: {e}", parent.display()))
            })?;
        }
        let backend = Self::open(libsql::Builder::new_local(path).build().await).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Throwaway in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        Self::open(libsql::Builder::new_local(":memory:").build().await).await
    }

    async fn open(built: Result<LibSqlDatabase, libsql::Error>) -> Result<Self, DatabaseError> {
        let db = built.map_err(|e| DatabaseError::Pool(format!("open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("connect: {e}")))?;
        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// RFC 3339 as written by this backend, or SQLite's `datetime('now')` form.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_saved_workflow(row: &libsql::Row) -> Result<SavedWorkflow, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("saved_workflows row: {e}"));

    let id: String = row.get(0).map_err(read)?;
    let user_id: String = row.get(1).map_err(read)?;
    let session_id: String = row.get(2).map_err(read)?;
    let workflow_json: String = row.get(3).map_err(read)?;
    let remote_id: Option<String> = row.get(4).map_err(read)?;
    let created_at: String = row.get(5).map_err(read)?;

    let workflow: WorkflowGraph = serde_json::from_str(&workflow_json)
        .map_err(|e| DatabaseError::Serialization(format!("saved workflow {id}: {e}")))?;

    Ok(SavedWorkflow {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        user_id,
        session_id: Uuid::parse_str(&session_id).unwrap_or_else(|_| Uuid::nil()),
        workflow,
        remote_id,
        created_at: parse_datetime(&created_at),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError> {
        let query_err = |e: libsql::Error| DatabaseError::Query(format!("get_setting {key}: {e}"));
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };
        let raw: String = row.get(0).map_err(query_err)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(user_id, key, error = %e, "Unreadable setting value");
                Ok(Some(serde_json::Value::Null))
            }
        }
    }

    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let encoded = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(format!("setting {key}: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO settings (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![user_id, key, encoded, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting {key}: {e}")))?;
        debug!(user_id, key, "Setting stored");
        Ok(())
    }

    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM settings WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_setting {key}: {e}")))?;
        Ok(removed > 0)
    }

    // ── Saved workflows ─────────────────────────────────────────────

    async fn record_saved_workflow(&self, saved: &SavedWorkflow) -> Result<(), DatabaseError> {
        let workflow_json = serde_json::to_string(&saved.workflow)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO saved_workflows (id, user_id, session_id, workflow, node_count, remote_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    saved.id.to_string(),
                    saved.user_id.as_str(),
                    saved.session_id.to_string(),
                    workflow_json,
                    saved.workflow.nodes.len() as i64,
                    opt_text(saved.remote_id.as_deref()),
                    saved.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_saved_workflow: {e}")))?;

        debug!(id = %saved.id, user_id = %saved.user_id, "Saved workflow recorded");
        Ok(())
    }

    async fn list_saved_workflows(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SavedWorkflow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, session_id, workflow, remote_id, created_at
                 FROM saved_workflows WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                params![user_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_saved_workflows: {e}")))?;

        let mut saved = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_saved_workflows: {e}")))?
        {
            saved.push(row_to_saved_workflow(&row)?);
        }
        Ok(saved)
    }
}
