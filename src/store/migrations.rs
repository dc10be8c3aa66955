//! Version-tracked database migrations for the libSQL backend.
//!
//! The `_migrations` ledger records the highest applied version; only newer
//! steps run, in order.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "settings",
        sql: r#"
            CREATE TABLE IF NOT EXISTS settings (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, key)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "saved_workflows",
        sql: r#"
            CREATE TABLE IF NOT EXISTS saved_workflows (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                workflow TEXT NOT NULL,
                node_count INTEGER NOT NULL,
                remote_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_saved_workflows_user
                ON saved_workflows(user_id, created_at);
        "#,
    },
];

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

fn migration_err(context: impl std::fmt::Display, e: libsql::Error) -> DatabaseError {
    DatabaseError::Migration(format!("{context}: {e}"))
}

/// Apply every migration newer than the database's current version.
///
/// Each step and its ledger row commit together, so a failed step leaves the
/// recorded version at the last one that fully applied.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(LEDGER_DDL, ())
        .await
        .map_err(|e| migration_err("create _migrations", e))?;

    let current = get_current_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        tracing::debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for step in &pending {
        tracing::info!(version = step.version, name = step.name, "Applying migration");
        let label = format!("V{} ({})", step.version, step.name);
        let tx = conn
            .transaction()
            .await
            .map_err(|e| migration_err(&label, e))?;
        tx.execute_batch(step.sql)
            .await
            .map_err(|e| migration_err(&label, e))?;
        record_version(&tx, step).await?;
        tx.commit().await.map_err(|e| migration_err(&label, e))?;
    }

    let migrated_to = get_current_version(conn).await?;
    tracing::info!(
        from = current,
        to = migrated_to,
        applied = pending.len(),
        "Schema migrated"
    );
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| migration_err("read schema version", e))?;
    match rows
        .next()
        .await
        .map_err(|e| migration_err("read schema version", e))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| migration_err("decode schema version", e)),
        None => Ok(0),
    }
}

async fn record_version(conn: &Connection, step: &Migration) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![step.version, step.name],
    )
    .await
    .map_err(|e| migration_err(format!("record V{}", step.version), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in &["_migrations", "settings", "saved_workflows"] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn migration_future_is_send() {
        let conn = test_conn().await;
        let fut = run_migrations(&conn);
        assert_send(&fut);
        fut.await.unwrap();
        assert_eq!(get_current_version(&conn).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn partial_database_is_upgraded() {
        let conn = test_conn().await;
        conn.execute(LEDGER_DDL, ()).await.unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).await.unwrap();
        record_version(&conn, &MIGRATIONS[0]).await.unwrap();

        run_migrations(&conn).await.unwrap();
        assert_eq!(get_current_version(&conn).await.unwrap(), 2);
    }
}
