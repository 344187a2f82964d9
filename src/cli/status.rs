//! CLI `status` command: per-table freshness and recent sync activity.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;

use smartsync::config::SmartSyncConfig;
use smartsync::db;
use smartsync::sync::analytics::build_snapshot;

/// Print the sync snapshot, as a table or as JSON.
pub fn status(config: &SmartSyncConfig, json: bool) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;

    let snapshot = build_snapshot(
        &conn,
        Utc::now(),
        config.sync.base_threshold_minutes,
        &HashSet::new(),
    )
    .context("failed to build sync snapshot")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Sync Status");
    println!("{}", "=".repeat(40));
    println!("  Database:            {}", db_path.display());
    println!("  Base threshold:      {} min", snapshot.base_threshold_minutes);
    println!();

    if snapshot.tables.is_empty() {
        println!("No tracked tables yet.");
    } else {
        println!(
            "  {:<16} {:<8} {:>4} {:>10} {:>9} {:>8} {:>8}",
            "TABLE", "STATE", "PRIO", "THRESHOLD", "SINCE", "LOCAL", "REMOTE"
        );
        for table in &snapshot.tables {
            let meta = &table.metadata;
            let since = table
                .minutes_since_sync
                .map(|m| format!("{m}m"))
                .unwrap_or_else(|| "never".into());
            let state = serde_json::to_value(table.state)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            let auto = if meta.auto_sync_enabled { "" } else { " (manual)" };
            println!(
                "  {:<16} {:<8} {:>4} {:>9}m {:>9} {:>8} {:>8}{auto}",
                meta.table_name,
                state,
                meta.sync_priority,
                table.threshold_minutes,
                since,
                meta.last_local_count,
                meta.last_remote_count,
            );
        }
    }
    println!();

    let day = &snapshot.last_24h;
    println!("Last 24h:");
    println!("  Queries:             {}", day.total_queries);
    println!("  Syncs triggered:     {}", day.syncs_triggered);
    println!("  Sync rate:           {:.1}%", day.sync_rate * 100.0);
    println!("  Avg sync duration:   {:.0} ms", day.avg_sync_duration_ms);
    println!();

    if !snapshot.top_queries.is_empty() {
        println!("Top queries (7d):");
        for q in &snapshot.top_queries {
            println!("  {:<24} {:>6}  avg {:.1} results", q.query_type, q.count, q.avg_results);
        }
        println!();
    }

    if !snapshot.recent_syncs.is_empty() {
        println!("Recent syncs:");
        for s in &snapshot.recent_syncs {
            let outcome = if s.success {
                "ok".to_string()
            } else {
                format!("FAILED: {}", s.error.as_deref().unwrap_or("unknown error"))
            };
            println!(
                "  {}  {:<9} {:<20} {:>5} rows  {outcome}",
                s.at.format("%Y-%m-%d %H:%M:%S"),
                s.direction.as_str(),
                s.tables_affected.join(","),
                s.rows_synced,
            );
        }
    }

    Ok(())
}
