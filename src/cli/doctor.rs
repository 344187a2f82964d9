//! CLI `doctor` command: local store diagnostics plus a remote liveness probe.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;

use smartsync::config::SmartSyncConfig;
use smartsync::db;
use smartsync::remote;
use smartsync::sync::analytics::stale_tables;

/// Run diagnostics and print a health report.
pub async fn doctor(config: &SmartSyncConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `smartsync serve` or `smartsync sync` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("smartsync Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Bookkeeping:");
    println!("  Tracked tables:  {}", report.tracked_tables);
    println!("  Query log:       {}", report.query_log_count);
    println!("  Sync log:        {}", report.sync_log_count);
    println!("  Failed syncs:    {}", report.failed_syncs);
    println!();

    let stale = stale_tables(&conn, Utc::now(), config.sync.base_threshold_minutes, &HashSet::new())?;
    if stale.is_empty() {
        println!("Freshness:         all tracked tables fresh");
    } else {
        println!("Freshness:         stale or never synced: {}", stale.join(", "));
    }

    println!();
    println!("Remote:");
    println!("  Kind:            {}", config.remote.kind);
    match config.remote.kind.as_str() {
        "http" => println!("  URL:             {}", config.remote.url),
        _ => println!("  Database:        {}", config.remote.database),
    }
    let alive = match remote::create_channel(&config.remote) {
        Ok(channel) => channel.alive(config.remote.timeouts.alive()).await,
        Err(e) => {
            println!("  Config error:    {e:#}");
            false
        }
    };
    if alive {
        println!("  Status:          reachable");
    } else {
        println!("  Status:          UNREACHABLE (queries will serve local data)");
    }
    println!();

    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Move the damaged file aside: mv {0} {0}.bad", db_path.display());
        println!("  2. Run `smartsync sync` to bootstrap tracked tables from the remote.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
