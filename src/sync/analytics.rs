//! Read-only aggregations over the query log, sync log, and freshness registry.

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use super::clock::format_timestamp;
use super::decision::{table_state, threshold};
use super::error::SyncResult;
use super::introspect::count_rows;
use super::query_log::recent_sync_log;
use super::registry::all_tracked;
use super::types::{SyncLogEntry, SyncMetadata, TableState};
use super::wrapper::ResultCount;
use super::SyncCache;

/// Aggregates over a time window of `query_log`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryWindowStats {
    pub total_queries: u64,
    pub syncs_triggered: u64,
    /// `syncs_triggered / total_queries`, 0 when there were no queries.
    pub sync_rate: f64,
    /// Mean `sync_duration_ms` over entries with `sync_triggered`.
    pub avg_sync_duration_ms: f64,
    pub avg_results: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    #[serde(flatten)]
    pub metadata: SyncMetadata,
    pub state: TableState,
    pub threshold_minutes: i64,
    pub minutes_since_sync: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryTypeStats {
    pub query_type: String,
    pub count: u64,
    pub avg_results: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    pub generated_at: DateTime<Utc>,
    pub base_threshold_minutes: u32,
    pub last_24h: QueryWindowStats,
    pub tables: Vec<TableStatus>,
    /// Most frequent query types over the last 7 days.
    pub top_queries: Vec<QueryTypeStats>,
    /// Local row count per tracked table; `None` when the table does not exist locally.
    pub record_counts: BTreeMap<String, Option<i64>>,
    pub recent_syncs: Vec<SyncLogEntry>,
}

impl ResultCount for SyncSnapshot {}

/// Query log aggregates for entries at or after `since`.
pub fn window_stats(conn: &Connection, since: DateTime<Utc>) -> SyncResult<QueryWindowStats> {
    let (total, triggered, avg_duration, avg_results): (i64, i64, Option<f64>, Option<f64>) = conn
        .query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(sync_triggered), 0),
                    AVG(CASE WHEN sync_triggered THEN sync_duration_ms END),
                    AVG(query_result_count)
             FROM query_log
             WHERE julianday(query_timestamp) >= julianday(?1)",
            [format_timestamp(since)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

    let total = total.max(0) as u64;
    let triggered = triggered.max(0) as u64;
    Ok(QueryWindowStats {
        total_queries: total,
        syncs_triggered: triggered,
        sync_rate: if total == 0 {
            0.0
        } else {
            triggered as f64 / total as f64
        },
        avg_sync_duration_ms: avg_duration.unwrap_or(0.0),
        avg_results: avg_results.unwrap_or(0.0),
    })
}

pub fn top_query_types(
    conn: &Connection,
    since: DateTime<Utc>,
    limit: usize,
) -> SyncResult<Vec<QueryTypeStats>> {
    let mut stmt = conn.prepare(
        "SELECT query_type, COUNT(*) AS n, AVG(query_result_count)
         FROM query_log
         WHERE julianday(query_timestamp) >= julianday(?1)
         GROUP BY query_type
         ORDER BY n DESC, query_type
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![format_timestamp(since), limit as i64],
            |row| {
                Ok(QueryTypeStats {
                    query_type: row.get(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                    avg_results: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn local_count(conn: &Connection, table: &str) -> SyncResult<Option<i64>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    match exists {
        Some(()) => Ok(Some(count_rows(conn, table)?)),
        None => Ok(None),
    }
}

/// Tracked tables that are stale or have never been synced.
pub fn stale_tables(
    conn: &Connection,
    now: DateTime<Utc>,
    base_threshold_minutes: u32,
    syncing: &HashSet<String>,
) -> SyncResult<Vec<String>> {
    Ok(all_tracked(conn)?
        .into_iter()
        .filter(|meta| {
            matches!(
                table_state(
                    Some(meta),
                    now,
                    base_threshold_minutes,
                    syncing.contains(&meta.table_name)
                ),
                TableState::Stale | TableState::Unknown
            )
        })
        .map(|meta| meta.table_name)
        .collect())
}

/// Full snapshot of registry state and recent activity.
pub fn build_snapshot(
    conn: &Connection,
    now: DateTime<Utc>,
    base_threshold_minutes: u32,
    syncing: &HashSet<String>,
) -> SyncResult<SyncSnapshot> {
    let tracked = all_tracked(conn)?;

    let mut record_counts = BTreeMap::new();
    for meta in &tracked {
        record_counts.insert(meta.table_name.clone(), local_count(conn, &meta.table_name)?);
    }

    let tables = tracked
        .into_iter()
        .map(|meta| {
            let state = table_state(
                Some(&meta),
                now,
                base_threshold_minutes,
                syncing.contains(&meta.table_name),
            );
            TableStatus {
                threshold_minutes: threshold(meta.sync_priority, base_threshold_minutes)
                    .num_minutes(),
                minutes_since_sync: meta.last_sync_timestamp.map(|t| (now - t).num_minutes()),
                state,
                metadata: meta,
            }
        })
        .collect();

    Ok(SyncSnapshot {
        generated_at: now,
        base_threshold_minutes,
        last_24h: window_stats(conn, now - TimeDelta::hours(24))?,
        tables,
        top_queries: top_query_types(conn, now - TimeDelta::days(7), 5)?,
        record_counts,
        recent_syncs: recent_sync_log(conn, 10)?,
    })
}

impl SyncCache {
    /// Snapshot outside the query wrapper (no log entry). Used by the CLI.
    pub fn snapshot(&self) -> SyncResult<SyncSnapshot> {
        let now = self.now();
        let syncing = self.syncing_tables();
        self.with_conn(|conn| {
            build_snapshot(conn, now, self.settings.base_threshold_minutes, &syncing)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::query_log::{append, NewQueryLog};
    use crate::sync::registry::record_sync;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn log(conn: &Connection, kind: &str, triggered: bool, ms: u64, results: u64, at: DateTime<Utc>) {
        let tables = vec!["docs".to_string()];
        append(
            conn,
            &NewQueryLog {
                query_type: kind,
                tables: &tables,
                sync_triggered: triggered,
                sync_duration_ms: ms,
                result_count: results,
                at,
                user_context: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn window_averages_only_triggered_durations() {
        let conn = crate::db::open_memory_database().unwrap();
        log(&conn, "search_docs", true, 100, 2, now());
        log(&conn, "search_docs", true, 0, 4, now());
        log(&conn, "health_check", false, 0, 1, now());
        log(&conn, "old", true, 9999, 1, now() - TimeDelta::hours(25));

        let stats = window_stats(&conn, now() - TimeDelta::hours(24)).unwrap();
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.syncs_triggered, 2);
        assert!((stats.avg_sync_duration_ms - 50.0).abs() < f64::EPSILON);
        assert!((stats.sync_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((stats.avg_results - 7.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window() {
        let conn = crate::db::open_memory_database().unwrap();
        let stats = window_stats(&conn, now()).unwrap();
        assert_eq!(stats.total_queries, 0);
        assert_eq!(stats.sync_rate, 0.0);
        assert_eq!(stats.avg_sync_duration_ms, 0.0);
    }

    #[test]
    fn snapshot_reports_states_and_counts() {
        let conn = crate::db::open_memory_database().unwrap();
        conn.execute("INSERT INTO docs (id, title) VALUES (1, 'a')", [])
            .unwrap();
        record_sync(&conn, "docs", 1, 1, now() - TimeDelta::minutes(10)).unwrap();
        record_sync(&conn, "clusters", 0, 0, now() - TimeDelta::hours(5)).unwrap();
        record_sync(&conn, "ghost", 0, 0, now()).unwrap();
        log(&conn, "search_docs", false, 0, 1, now());
        log(&conn, "search_docs", false, 0, 3, now());
        log(&conn, "analytics", false, 0, 1, now());

        let syncing = HashSet::new();
        let snapshot = build_snapshot(&conn, now(), 30, &syncing).unwrap();

        let state_of = |name: &str| {
            snapshot
                .tables
                .iter()
                .find(|t| t.metadata.table_name == name)
                .map(|t| t.state)
        };
        assert_eq!(state_of("docs"), Some(TableState::Fresh));
        assert_eq!(state_of("clusters"), Some(TableState::Stale));
        assert_eq!(snapshot.record_counts["docs"], Some(1));
        assert_eq!(snapshot.record_counts["ghost"], None);
        assert_eq!(snapshot.top_queries[0].query_type, "search_docs");
        assert_eq!(snapshot.top_queries[0].count, 2);
        assert_eq!(snapshot.last_24h.total_queries, 3);

        let stale = stale_tables(&conn, now(), 30, &syncing).unwrap();
        assert_eq!(stale, vec!["clusters".to_string()]);
    }
}
