//! Sync decision engine.
//!
//! Pure functions over a registry snapshot and a supplied `now`: no I/O, no locking,
//! O(tables). A table is fresh while `now - last_sync <= base_threshold * priority`.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};

use super::types::{SyncMetadata, TableState};

/// Freshness window for a priority.
pub fn threshold(priority: u8, base_threshold_minutes: u32) -> TimeDelta {
    TimeDelta::minutes(i64::from(base_threshold_minutes) * i64::from(priority))
}

/// Whether one table must be reconciled before it is read.
pub fn needs_refresh(
    meta: Option<&SyncMetadata>,
    now: DateTime<Utc>,
    base_threshold_minutes: u32,
) -> bool {
    let Some(meta) = meta else {
        return true;
    };
    if !meta.auto_sync_enabled {
        return false;
    }
    match meta.last_sync_timestamp {
        None => true,
        Some(last) => now - last > threshold(meta.sync_priority, base_threshold_minutes),
    }
}

/// Subset of `tables` to reconcile, in input order, each name at most once.
pub fn select_tables(
    tables: &[String],
    snapshot: &HashMap<String, SyncMetadata>,
    now: DateTime<Utc>,
    base_threshold_minutes: u32,
) -> Vec<String> {
    let mut seen = HashSet::new();
    tables
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .filter(|t| needs_refresh(snapshot.get(t.as_str()), now, base_threshold_minutes))
        .cloned()
        .collect()
}

/// Externally observed state of a table.
pub fn table_state(
    meta: Option<&SyncMetadata>,
    now: DateTime<Utc>,
    base_threshold_minutes: u32,
    syncing: bool,
) -> TableState {
    if syncing {
        return TableState::Syncing;
    }
    match meta.and_then(|m| m.last_sync_timestamp.map(|last| (m, last))) {
        None => TableState::Unknown,
        Some((meta, last)) => {
            if now - last > threshold(meta.sync_priority, base_threshold_minutes) {
                TableState::Stale
            } else {
                TableState::Fresh
            }
        }
    }
}
