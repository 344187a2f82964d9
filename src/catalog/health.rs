//! Catalog health check and the sync status tool.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

use crate::sync::analytics::{build_snapshot, stale_tables, SyncSnapshot};
use crate::sync::clock::format_timestamp;
use crate::sync::{ResultCount, SyncCache, SyncResult};

/// Docs scoring below this on quality or relevance need attention.
pub const ATTENTION_SCORE: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => Self::Healthy,
            1..=2 => Self::Warning,
            _ => Self::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub last_check: String,
}

impl ResultCount for HealthReport {}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<i64> {
    conn.query_row(sql, [], |row| row.get(0))
}

/// Run every check against the local store.
pub fn check(
    conn: &Connection,
    now: DateTime<Utc>,
    base_threshold_minutes: u32,
    syncing: &HashSet<String>,
) -> SyncResult<HealthReport> {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let weak_docs = conn.query_row(
        "SELECT COUNT(*) FROM docs
         WHERE content_status = 'active' AND (quality_score < ?1 OR relevance_score < ?1)",
        [ATTENTION_SCORE],
        |row| row.get::<_, i64>(0),
    )?;
    if weak_docs > 0 {
        issues.push(format!("{weak_docs} docs need attention"));
        recommendations.push("Review docs with low quality or relevance scores".to_string());
    }

    let childless = count(
        conn,
        "SELECT COUNT(*) FROM items i
         LEFT JOIN child_items c ON c.item_id = i.id
         WHERE c.id IS NULL AND i.status = 'active'",
    )?;
    if childless > 0 {
        issues.push(format!("{childless} active items without child items"));
        recommendations.push("Break active items down into child items".to_string());
    }

    let empty_clusters = count(
        conn,
        "SELECT COUNT(*) FROM clusters cl
         WHERE NOT EXISTS (
             SELECT 1 FROM docs d
             WHERE d.cluster_name = cl.name AND d.content_status = 'active'
         )",
    )?;
    if empty_clusters > 0 {
        issues.push(format!("{empty_clusters} clusters without active docs"));
        recommendations.push("Remove empty clusters or assign docs to them".to_string());
    }

    let stale = stale_tables(conn, now, base_threshold_minutes, syncing)?;
    if !stale.is_empty() {
        issues.push(format!("stale tracked tables: {}", stale.join(", ")));
        recommendations.push("Run `smartsync sync` or check remote connectivity".to_string());
    }

    Ok(HealthReport {
        status: HealthStatus::from_issue_count(issues.len()),
        issues,
        recommendations,
        last_check: format_timestamp(now),
    })
}

pub async fn health_check(cache: &SyncCache) -> SyncResult<HealthReport> {
    let base = cache.settings().base_threshold_minutes;
    cache
        .run(
            "health_check",
            &["docs", "clusters", "items", "child_items"],
            |conn| {
                // freshness is judged after the pre-query sync has run
                let now = cache.now();
                let syncing = cache.syncing_tables();
                Ok(check(conn, now, base, &syncing)?)
            },
        )
        .await
}

pub async fn get_sync_status(cache: &SyncCache) -> SyncResult<SyncSnapshot> {
    let base = cache.settings().base_threshold_minutes;
    cache
        .run("get_sync_status", &[], |conn| {
            let now = cache.now();
            let syncing = cache.syncing_tables();
            Ok(build_snapshot(conn, now, base, &syncing)?)
        })
        .await
}
