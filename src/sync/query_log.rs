//! Append-only `query_log` and `sync_log` access.
//!
//! The crate never updates or deletes rows in either table; pruning is left to the
//! operator.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::clock::{format_timestamp, parse_timestamp};
use super::error::SyncResult;
use super::types::{Direction, QueryLogEntry, SyncLogEntry};

/// Fields of a query log row that the wrapper fills in.
#[derive(Debug, Clone)]
pub struct NewQueryLog<'a> {
    pub query_type: &'a str,
    pub tables: &'a [String],
    pub sync_triggered: bool,
    pub sync_duration_ms: u64,
    pub result_count: u64,
    pub at: DateTime<Utc>,
    pub user_context: Option<&'a serde_json::Value>,
}

/// Append one query log row and return its id.
pub fn append(conn: &Connection, entry: &NewQueryLog<'_>) -> SyncResult<i64> {
    // a positive duration implies a triggered sync
    let sync_triggered = entry.sync_triggered || entry.sync_duration_ms > 0;
    let context = entry.user_context.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO query_log
             (query_type, tables_accessed, sync_triggered, sync_duration_ms,
              query_result_count, query_timestamp, user_context)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.query_type,
            entry.tables.join(","),
            sync_triggered,
            i64::try_from(entry.sync_duration_ms).unwrap_or(i64::MAX),
            i64::try_from(entry.result_count).unwrap_or(i64::MAX),
            format_timestamp(entry.at),
            context,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn split_tables(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn row_to_query_log(row: &Row<'_>) -> rusqlite::Result<QueryLogEntry> {
    let tables: String = row.get(2)?;
    let at: String = row.get(6)?;
    let context: Option<String> = row.get(7)?;
    Ok(QueryLogEntry {
        id: row.get(0)?,
        query_type: row.get(1)?,
        tables_accessed: split_tables(&tables),
        sync_triggered: row.get(3)?,
        sync_duration_ms: row.get::<_, i64>(4)?.max(0) as u64,
        query_result_count: row.get::<_, i64>(5)?.max(0) as u64,
        query_timestamp: parse_timestamp(&at).unwrap_or_default(),
        user_context: context.and_then(|c| serde_json::from_str(&c).ok()),
    })
}

/// Most recent query log rows, newest first.
pub fn recent(conn: &Connection, limit: usize) -> SyncResult<Vec<QueryLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, query_type, tables_accessed, sync_triggered, sync_duration_ms,
                query_result_count, query_timestamp, user_context
         FROM query_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], row_to_query_log)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Append one reconciliation attempt to `sync_log`.
pub fn append_sync_log(
    conn: &Connection,
    session_id: &str,
    direction: Direction,
    tables: &[String],
    rows_synced: usize,
    success: bool,
    error: Option<&str>,
    at: DateTime<Utc>,
) -> SyncResult<i64> {
    conn.execute(
        "INSERT INTO sync_log (session_id, direction, tables_affected, rows_synced, success, error, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            session_id,
            direction.as_str(),
            tables.join(","),
            rows_synced as i64,
            success,
            error,
            format_timestamp(at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent sync log rows, newest first.
pub fn recent_sync_log(conn: &Connection, limit: usize) -> SyncResult<Vec<SyncLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, direction, tables_affected, rows_synced, success, error, at
         FROM sync_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            let direction: String = row.get(2)?;
            let tables: String = row.get(3)?;
            let at: String = row.get(7)?;
            Ok(SyncLogEntry {
                id: row.get(0)?,
                session_id: row.get(1)?,
                direction: match direction.as_str() {
                    "pull" => Direction::Pull,
                    "bootstrap" => Direction::Bootstrap,
                    _ => Direction::Push,
                },
                tables_affected: split_tables(&tables),
                rows_synced: row.get(4)?,
                success: row.get(5)?,
                error: row.get(6)?,
                at: parse_timestamp(&at).unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
