//! CLI `sync` command: reconcile tables now, regardless of freshness.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use smartsync::config::SmartSyncConfig;
use smartsync::sync::wrapper::TableSync;

/// Force a sync of `tables`, or of every tracked table when none are given.
pub async fn sync(config: &SmartSyncConfig, tables: Vec<String>) -> Result<()> {
    let cache = crate::server::build_cache(config)?;

    let tables = if tables.is_empty() {
        cache
            .with_conn(smartsync::sync::registry::all_tracked)?
            .into_iter()
            .map(|meta| meta.table_name)
            .collect()
    } else {
        tables
    };
    if tables.is_empty() {
        println!("Nothing to sync: no tracked tables.");
        return Ok(());
    }

    let pb = ProgressBar::new(tables.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:30.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let mut failures = 0usize;
    let mut lines = Vec::with_capacity(tables.len());
    for table in &tables {
        pb.set_message(table.clone());
        let result = cache.sync_table(table).await;
        let line = match &result {
            TableSync::AlreadyFresh => format!("{table}: already fresh"),
            TableSync::Verified { local, remote } => {
                format!("{table}: in agreement (local {local}, remote {remote})")
            }
            TableSync::Reconciled(outcome) if outcome.success => format!(
                "{table}: {} {} rows",
                outcome.direction, outcome.rows_moved
            ),
            TableSync::Reconciled(outcome) => {
                failures += 1;
                format!(
                    "{table}: {} FAILED: {}",
                    outcome.direction,
                    outcome.error.as_deref().unwrap_or("unknown error")
                )
            }
            TableSync::RemoteUnknown(error) | TableSync::Failed(error) => {
                failures += 1;
                format!("{table}: FAILED: {error}")
            }
        };
        lines.push(line);
        pb.inc(1);
    }
    pb.finish_and_clear();

    for line in &lines {
        println!("  {line}");
    }
    println!();
    println!("Synced {} of {} tables.", tables.len() - failures, tables.len());

    anyhow::ensure!(failures == 0, "{failures} table(s) failed to sync");
    Ok(())
}
