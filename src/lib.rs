//! Query-triggered sync cache between a local SQLite store and a remote libSQL database.
//!
//! smartsync is an [MCP](https://modelcontextprotocol.io/) server whose tools read from a
//! local SQLite file. Before a tool reads, the tables it declares are checked against a
//! freshness threshold scaled by each table's priority:
//!
//! | Priority | Threshold (base 30 min) |
//! |----------|-------------------------|
//! | 1 | 30 min |
//! | 2 | 60 min |
//! | 3 (default) | 90 min |
//! | 5 | 150 min |
//!
//! Stale tables are compared with the remote (row counts, then `updated_at`, then a
//! content fingerprint) and reconciled by pushing, pulling, or bootstrapping from a
//! dump. When the remote is unreachable the tool still answers from local data. Every
//! call is recorded in `query_log`, every reconciliation in `sync_log`.
//!
//! # Architecture
//!
//! - **Storage**: SQLite via rusqlite (WAL, bundled)
//! - **Remote**: Turso CLI subprocess or the libSQL HTTP pipeline endpoint
//! - **Transport**: MCP over stdio (primary) or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite database initialization, schema, migrations, and health checks
//! - [`remote`]: Remote channel trait, adapters, quoting, and output parsing
//! - [`sync`]: The sync cache: decision, detection, reconciliation, query wrapper
//! - [`catalog`]: Tool queries over docs, clusters, and work items

pub mod catalog;
pub mod config;
pub mod db;
pub mod remote;
pub mod sync;
