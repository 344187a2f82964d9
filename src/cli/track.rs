//! CLI `track` command: register a table and adjust its sync settings.

use anyhow::Result;
use chrono::Utc;

use smartsync::config::SmartSyncConfig;
use smartsync::db;
use smartsync::sync::registry;
use smartsync::sync::types::PushStrategy;

pub fn track(
    config: &SmartSyncConfig,
    table: &str,
    priority: Option<u8>,
    auto: Option<bool>,
    strategy: Option<PushStrategy>,
) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;
    let now = Utc::now();

    let created = registry::register(
        &conn,
        table,
        priority.unwrap_or(registry::DEFAULT_PRIORITY),
        auto.unwrap_or(true),
        strategy.unwrap_or_default(),
        now,
    )?;
    if !created {
        if let Some(priority) = priority {
            registry::set_priority(&conn, table, priority, now)?;
        }
        if let Some(auto) = auto {
            registry::set_auto(&conn, table, auto, now)?;
        }
        if let Some(strategy) = strategy {
            registry::set_push_strategy(&conn, table, strategy, now)?;
        }
    }

    let Some(meta) = registry::get(&conn, table)? else {
        anyhow::bail!("table {table} is not tracked");
    };
    println!(
        "{} {}: priority {}, auto sync {}, push strategy {}",
        if created { "Tracking" } else { "Updated" },
        meta.table_name,
        meta.sync_priority,
        if meta.auto_sync_enabled { "on" } else { "off" },
        meta.push_strategy,
    );
    Ok(())
}
