pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Open (or create) the local store at the given path with schema, catalog, and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL keeps readers in other processes unblocked while the cache writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    prepare(&conn)?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory local store with the full schema. Used by tests and dry runs.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    schema::init_schema(conn).context("failed to initialize schema")?;
    schema::init_catalog(conn).context("failed to initialize catalog tables")?;
    migrations::run_migrations(conn).context("failed to run migrations")?;
    Ok(())
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub tracked_tables: u64,
    pub query_log_count: u64,
    pub sync_log_count: u64,
    pub failed_syncs: u64,
}

/// Run `PRAGMA integrity_check` and collect bookkeeping row counts.
pub fn check_database_health(conn: &Connection) -> Result<DatabaseHealth> {
    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let schema_version = migrations::get_schema_version(conn)?;

    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    };

    Ok(DatabaseHealth {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version,
        tracked_tables: count("SELECT COUNT(*) FROM sync_metadata")?,
        query_log_count: count("SELECT COUNT(*) FROM query_log")?,
        sync_log_count: count("SELECT COUNT(*) FROM sync_log")?,
        failed_syncs: count("SELECT COUNT(*) FROM sync_log WHERE success = 0")?,
    })
}
