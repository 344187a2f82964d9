//! SQL DDL for all smartsync tables.
//!
//! Bookkeeping tables (`sync_metadata`, `query_log`, `sync_log`, `schema_meta`) are
//! owned by the cache. The catalog tables (`docs`, `clusters`, `items`,
//! `child_items`, `context`) are the application tables the MCP tools read; the sync
//! core treats them as opaque and only relies on their `id` column. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Bookkeeping tables, schema version 1. Later columns arrive through migrations.
const SCHEMA_SQL: &str = r#"
-- Freshness registry: one row per tracked table
CREATE TABLE IF NOT EXISTS sync_metadata (
    table_name TEXT PRIMARY KEY,
    last_sync_timestamp TIMESTAMP,
    last_local_count INTEGER NOT NULL DEFAULT 0 CHECK(last_local_count >= 0),
    last_remote_count INTEGER NOT NULL DEFAULT 0 CHECK(last_remote_count >= 0),
    sync_priority INTEGER NOT NULL DEFAULT 3 CHECK(sync_priority BETWEEN 1 AND 5),
    auto_sync_enabled BOOLEAN NOT NULL DEFAULT 1,
    last_query_timestamp TIMESTAMP,
    query_count INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

-- Append-only log of every wrapped query
CREATE TABLE IF NOT EXISTS query_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query_type TEXT NOT NULL,
    tables_accessed TEXT NOT NULL,
    sync_triggered BOOLEAN NOT NULL DEFAULT 0,
    sync_duration_ms INTEGER NOT NULL DEFAULT 0 CHECK(sync_duration_ms >= 0),
    query_result_count INTEGER NOT NULL DEFAULT 0 CHECK(query_result_count >= 0),
    query_timestamp TIMESTAMP NOT NULL,
    user_context TEXT
);

-- One row per reconciliation attempt
CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    direction TEXT NOT NULL CHECK(direction IN ('push','pull','bootstrap')),
    tables_affected TEXT NOT NULL,
    rows_synced INTEGER NOT NULL DEFAULT 0,
    success BOOLEAN NOT NULL,
    error TEXT,
    at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_log_session ON sync_log(session_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Catalog tables served by the MCP tools.
const CATALOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS docs (
    id INTEGER PRIMARY KEY,
    slug TEXT,
    title TEXT NOT NULL,
    summary TEXT,
    keywords TEXT,
    category TEXT,
    difficulty TEXT,
    doc_type TEXT,
    cluster_name TEXT,
    cluster_priority INTEGER NOT NULL DEFAULT 0,
    quality_score REAL NOT NULL DEFAULT 0,
    relevance_score REAL NOT NULL DEFAULT 0,
    view_count INTEGER NOT NULL DEFAULT 0,
    estimated_read_time INTEGER,
    content_status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_docs_cluster ON docs(cluster_name);
CREATE INDEX IF NOT EXISTS idx_docs_status ON docs(content_status);

CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT,
    description TEXT,
    icon TEXT,
    color TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    title TEXT,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    priority TEXT NOT NULL DEFAULT 'medium',
    created_at TEXT,
    updated_at TEXT
);

CREATE TABLE IF NOT EXISTS child_items (
    id INTEGER PRIMARY KEY,
    item_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_child_items_item ON child_items(item_id);

CREATE TABLE IF NOT EXISTS context (
    id INTEGER PRIMARY KEY,
    item_id INTEGER NOT NULL,
    context_type TEXT,
    content TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_context_item ON context(item_id);
"#;

/// Initialize bookkeeping tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// Initialize the catalog tables. Idempotent; existing user data is untouched.
pub fn init_catalog(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CATALOG_SQL)
}
