//! Freshness registry: the `sync_metadata` table and the operations over it.
//!
//! Every write is a single upsert, so a row is never observed half-updated. Nothing
//! here touches the remote channel.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::clock::{format_timestamp, parse_timestamp};
use super::error::{SyncError, SyncResult};
use super::types::{PushStrategy, SyncMetadata};

const COLUMNS: &str = "table_name, last_sync_timestamp, last_local_count, last_remote_count, \
     sync_priority, auto_sync_enabled, push_strategy, last_query_timestamp, query_count, \
     created_at, updated_at";

pub const DEFAULT_PRIORITY: u8 = 3;

fn row_to_metadata(row: &Row<'_>) -> rusqlite::Result<SyncMetadata> {
    let ts = |idx: usize| -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row
            .get::<_, Option<String>>(idx)?
            .as_deref()
            .and_then(parse_timestamp))
    };
    let strategy: String = row.get(6)?;

    Ok(SyncMetadata {
        table_name: row.get(0)?,
        last_sync_timestamp: ts(1)?,
        last_local_count: row.get(2)?,
        last_remote_count: row.get(3)?,
        sync_priority: row.get(4)?,
        auto_sync_enabled: row.get(5)?,
        push_strategy: strategy.parse().unwrap_or_default(),
        last_query_timestamp: ts(7)?,
        query_count: row.get(8)?,
        created_at: ts(9)?.unwrap_or_default(),
        updated_at: ts(10)?.unwrap_or_default(),
    })
}

pub fn get(conn: &Connection, table: &str) -> SyncResult<Option<SyncMetadata>> {
    let meta = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM sync_metadata WHERE table_name = ?1"),
            [table],
            row_to_metadata,
        )
        .optional()?;
    Ok(meta)
}

/// Snapshot of the rows for `tables`. Untracked tables are simply absent.
pub fn get_many(
    conn: &Connection,
    tables: &[String],
) -> SyncResult<std::collections::HashMap<String, SyncMetadata>> {
    let mut snapshot = std::collections::HashMap::with_capacity(tables.len());
    for table in tables {
        if let Some(meta) = get(conn, table)? {
            snapshot.insert(table.clone(), meta);
        }
    }
    Ok(snapshot)
}

pub fn all_tracked(conn: &Connection) -> SyncResult<Vec<SyncMetadata>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM sync_metadata ORDER BY table_name"
    ))?;
    let rows = stmt
        .query_map([], row_to_metadata)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Record a successful reconciliation. Creates the row if needed; priority, auto flag,
/// and push strategy of an existing row are preserved.
pub fn record_sync(
    conn: &Connection,
    table: &str,
    local_count: i64,
    remote_count: i64,
    at: DateTime<Utc>,
) -> SyncResult<()> {
    let at = format_timestamp(at);
    conn.execute(
        "INSERT INTO sync_metadata
             (table_name, last_sync_timestamp, last_local_count, last_remote_count,
              created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?2, ?2)
         ON CONFLICT(table_name) DO UPDATE SET
             last_sync_timestamp = excluded.last_sync_timestamp,
             last_local_count = excluded.last_local_count,
             last_remote_count = excluded.last_remote_count,
             updated_at = excluded.updated_at",
        params![table, at, local_count.max(0), remote_count.max(0)],
    )?;
    tracing::debug!(table, local_count, remote_count, "sync recorded");
    Ok(())
}

pub fn set_priority(
    conn: &Connection,
    table: &str,
    priority: u8,
    at: DateTime<Utc>,
) -> SyncResult<()> {
    if !(1..=5).contains(&priority) {
        return Err(SyncError::InvalidArgument(format!(
            "sync priority must be between 1 and 5, got {priority}"
        )));
    }
    let at = format_timestamp(at);
    conn.execute(
        "INSERT INTO sync_metadata (table_name, sync_priority, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(table_name) DO UPDATE SET
             sync_priority = excluded.sync_priority,
             updated_at = excluded.updated_at",
        params![table, priority, at],
    )?;
    Ok(())
}

pub fn set_auto(conn: &Connection, table: &str, enabled: bool, at: DateTime<Utc>) -> SyncResult<()> {
    let at = format_timestamp(at);
    conn.execute(
        "INSERT INTO sync_metadata (table_name, auto_sync_enabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(table_name) DO UPDATE SET
             auto_sync_enabled = excluded.auto_sync_enabled,
             updated_at = excluded.updated_at",
        params![table, enabled, at],
    )?;
    Ok(())
}

pub fn set_push_strategy(
    conn: &Connection,
    table: &str,
    strategy: PushStrategy,
    at: DateTime<Utc>,
) -> SyncResult<()> {
    let at = format_timestamp(at);
    conn.execute(
        "INSERT INTO sync_metadata (table_name, push_strategy, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(table_name) DO UPDATE SET
             push_strategy = excluded.push_strategy,
             updated_at = excluded.updated_at",
        params![table, strategy.as_str(), at],
    )?;
    Ok(())
}

/// Register a table without disturbing an existing row. Returns `true` if a row was created.
pub fn register(
    conn: &Connection,
    table: &str,
    priority: u8,
    auto_sync: bool,
    strategy: PushStrategy,
    at: DateTime<Utc>,
) -> SyncResult<bool> {
    if !(1..=5).contains(&priority) {
        return Err(SyncError::InvalidArgument(format!(
            "sync priority must be between 1 and 5, got {priority}"
        )));
    }
    let at = format_timestamp(at);
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO sync_metadata
             (table_name, sync_priority, auto_sync_enabled, push_strategy, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![table, priority, auto_sync, strategy.as_str(), at],
    )?;
    Ok(inserted > 0)
}

/// Query telemetry: bump `query_count` and set `last_query_timestamp`.
pub fn touch(conn: &Connection, table: &str, at: DateTime<Utc>) -> SyncResult<()> {
    let at = format_timestamp(at);
    conn.execute(
        "INSERT INTO sync_metadata
             (table_name, last_query_timestamp, query_count, created_at, updated_at)
         VALUES (?1, ?2, 1, ?2, ?2)
         ON CONFLICT(table_name) DO UPDATE SET
             last_query_timestamp = excluded.last_query_timestamp,
             query_count = sync_metadata.query_count + 1,
             updated_at = excluded.updated_at",
        params![table, at],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn record_sync_creates_row() {
        let conn = db();
        assert!(get(&conn, "docs").unwrap().is_none());

        record_sync(&conn, "docs", 5, 5, t0()).unwrap();

        let meta = get(&conn, "docs").unwrap().unwrap();
        assert_eq!(meta.last_sync_timestamp, Some(t0()));
        assert_eq!(meta.last_local_count, 5);
        assert_eq!(meta.last_remote_count, 5);
        assert_eq!(meta.sync_priority, DEFAULT_PRIORITY);
        assert!(meta.auto_sync_enabled);
        assert_eq!(meta.push_strategy, PushStrategy::LastN);
        assert_eq!(meta.created_at, t0());
    }

    #[test]
    fn record_sync_preserves_admin_fields() {
        let conn = db();
        set_priority(&conn, "docs", 1, t0()).unwrap();
        set_auto(&conn, "docs", false, t0()).unwrap();
        set_push_strategy(&conn, "docs", PushStrategy::Full, t0()).unwrap();

        let later = t0() + TimeDelta::hours(1);
        record_sync(&conn, "docs", 7, 6, later).unwrap();

        let meta = get(&conn, "docs").unwrap().unwrap();
        assert_eq!(meta.sync_priority, 1);
        assert!(!meta.auto_sync_enabled);
        assert_eq!(meta.push_strategy, PushStrategy::Full);
        assert_eq!(meta.created_at, t0());
        assert_eq!(meta.updated_at, later);
        assert!(meta.updated_at >= meta.created_at);
    }

    #[test]
    fn priority_is_validated() {
        let conn = db();
        assert!(matches!(
            set_priority(&conn, "docs", 0, t0()),
            Err(SyncError::InvalidArgument(_))
        ));
        assert!(set_priority(&conn, "docs", 6, t0()).is_err());
        assert!(get(&conn, "docs").unwrap().is_none());
    }

    #[test]
    fn register_is_idempotent() {
        let conn = db();
        assert!(register(&conn, "items", 2, true, PushStrategy::ChangedSince, t0()).unwrap());
        record_sync(&conn, "items", 3, 3, t0()).unwrap();

        assert!(!register(&conn, "items", 5, false, PushStrategy::Full, t0()).unwrap());

        let meta = get(&conn, "items").unwrap().unwrap();
        assert_eq!(meta.sync_priority, 2);
        assert_eq!(meta.push_strategy, PushStrategy::ChangedSince);
        assert_eq!(meta.last_sync_timestamp, Some(t0()));
    }

    #[test]
    fn touch_counts_queries_without_syncing() {
        let conn = db();
        touch(&conn, "docs", t0()).unwrap();
        touch(&conn, "docs", t0() + TimeDelta::minutes(1)).unwrap();

        let meta = get(&conn, "docs").unwrap().unwrap();
        assert_eq!(meta.query_count, 2);
        assert_eq!(meta.last_query_timestamp, Some(t0() + TimeDelta::minutes(1)));
        assert!(meta.last_sync_timestamp.is_none());
    }

    #[test]
    fn all_tracked_is_sorted() {
        let conn = db();
        for table in ["items", "clusters", "docs"] {
            touch(&conn, table, t0()).unwrap();
        }
        let names: Vec<String> = all_tracked(&conn)
            .unwrap()
            .into_iter()
            .map(|m| m.table_name)
            .collect();
        assert_eq!(names, vec!["clusters", "docs", "items"]);
    }
}
