//! Core sync type definitions.
//!
//! Defines [`Direction`], [`ConflictPolicy`], [`PushStrategy`], [`TableState`], the
//! persisted [`SyncMetadata`] row, and the records written to `query_log` and `sync_log`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way rows move during a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local to remote.
    Push,
    /// Remote to local, latest rows only.
    Pull,
    /// Full copy of a table that does not exist locally yet.
    Bootstrap,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Bootstrap => "bootstrap",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How equal-count tables with differing content are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Local is authoritative on ties.
    #[default]
    LocalWins,
    RemoteWins,
    /// Larger side wins; equal sizes fall back to local.
    LargerWins,
}

impl ConflictPolicy {
    /// Direction for a table whose counts match but whose content differs.
    pub fn resolve_tie(&self) -> Direction {
        match self {
            Self::LocalWins | Self::LargerWins => Direction::Push,
            Self::RemoteWins => Direction::Pull,
        }
    }
}

/// Which local rows a push sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStrategy {
    /// Latest N rows by id.
    #[default]
    LastN,
    /// Rows whose `updated_at` is newer than the last sync.
    ChangedSince,
    /// Every row.
    Full,
}

impl PushStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastN => "last_n",
            Self::ChangedSince => "changed_since",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for PushStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PushStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_n" => Ok(Self::LastN),
            "changed_since" => Ok(Self::ChangedSince),
            "full" => Ok(Self::Full),
            _ => Err(format!(
                "unknown push strategy: {s} (expected last_n, changed_since, full)"
            )),
        }
    }
}

/// Externally observed sync state of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableState {
    /// No registry row, or never synced.
    Unknown,
    Fresh,
    Stale,
    /// A reconciliation is running right now.
    Syncing,
}

/// One row of `sync_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncMetadata {
    pub table_name: String,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_local_count: i64,
    pub last_remote_count: i64,
    pub sync_priority: u8,
    pub auto_sync_enabled: bool,
    pub push_strategy: PushStrategy,
    pub last_query_timestamp: Option<DateTime<Utc>>,
    pub query_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of one push, pull, or bootstrap. Reconciliation never fails loudly.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub table: String,
    pub direction: Direction,
    pub success: bool,
    pub rows_moved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconcileOutcome {
    pub fn ok(table: &str, direction: Direction, rows_moved: usize) -> Self {
        Self {
            table: table.to_string(),
            direction,
            success: true,
            rows_moved,
            error: None,
        }
    }

    pub fn failed(table: &str, direction: Direction, rows_moved: usize, error: String) -> Self {
        Self {
            table: table.to_string(),
            direction,
            success: false,
            rows_moved,
            error: Some(error),
        }
    }
}

/// One row of `query_log`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub id: i64,
    pub query_type: String,
    pub tables_accessed: Vec<String>,
    pub sync_triggered: bool,
    pub sync_duration_ms: u64,
    pub query_result_count: u64,
    pub query_timestamp: DateTime<Utc>,
    pub user_context: Option<serde_json::Value>,
}

/// One row of `sync_log`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub session_id: String,
    pub direction: Direction,
    pub tables_affected: Vec<String>,
    pub rows_synced: i64,
    pub success: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}
