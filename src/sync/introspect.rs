//! Run-time schema discovery for tracked tables.
//!
//! Tracked tables are opaque: the only required column is `id`. Column lists are
//! read once per process through `pragma_table_info` and cached until a bootstrap
//! replaces the table.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::clock::format_timestamp;
use crate::remote::quote::quote_ident;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<String>,
    pub has_updated_at: bool,
}

impl TableSchema {
    /// `"c1", "c2", ...`
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `?1, ?2, ...`
    pub fn placeholders(&self) -> String {
        (1..=self.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn upsert_sql(&self) -> String {
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote_ident(&self.name),
            self.column_list(),
            self.placeholders()
        )
    }
}

/// Read the column list of `table`, or `None` if it does not exist locally.
pub fn introspect(conn: &Connection, table: &str) -> rusqlite::Result<Option<TableSchema>> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns: Vec<String> = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let has_updated_at = columns.iter().any(|c| c == "updated_at");
    Ok(Some(TableSchema {
        name: table.to_string(),
        columns,
        has_updated_at,
    }))
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
}

/// Rows modified strictly after `since` according to `updated_at`.
pub fn changed_since_count(
    conn: &Connection,
    table: &str,
    since: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE julianday(updated_at) > julianday(?1)",
            quote_ident(table)
        ),
        [format_timestamp(since)],
        |row| row.get(0),
    )
}

/// Content fingerprint query producing `count:max_id:rows`.
///
/// `rows` is the hex of every row's quoted values in id order (`0` for an empty
/// table), so any edit to any value moves it. The same text runs on both sides.
/// Only tables without `updated_at` reach this comparison.
pub fn fingerprint_sql(schema: &TableSchema) -> String {
    let row = if schema.columns.is_empty() {
        "''".to_string()
    } else {
        schema
            .columns
            .iter()
            .map(|c| format!("quote({})", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" || ',' || ")
    };
    format!(
        "SELECT COUNT(*) || ':' || COALESCE(MAX(\"id\"), 0) || ':' || \
         COALESCE(group_concat(hex({row} || ';'), ''), '0') \
         FROM (SELECT * FROM {} ORDER BY \"id\");",
        quote_ident(&schema.name)
    )
}

pub fn local_fingerprint(conn: &Connection, schema: &TableSchema) -> rusqlite::Result<String> {
    conn.query_row(&fingerprint_sql(schema), [], |row| row.get(0))
}

/// Process-wide cache of introspected schemas.
#[derive(Debug, Default, Clone)]
pub struct SchemaCache {
    inner: Arc<Mutex<HashMap<String, TableSchema>>>,
}

impl SchemaCache {
    pub fn get_or_load(
        &self,
        conn: &Connection,
        table: &str,
    ) -> rusqlite::Result<Option<TableSchema>> {
        if let Ok(cache) = self.inner.lock() {
            if let Some(schema) = cache.get(table) {
                return Ok(Some(schema.clone()));
            }
        }

        let loaded = introspect(conn, table)?;
        if let (Some(schema), Ok(mut cache)) = (&loaded, self.inner.lock()) {
            cache.insert(table.to_string(), schema.clone());
        }
        Ok(loaded)
    }

    pub fn invalidate(&self, table: &str) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.remove(table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    #[test]
    fn introspect_catalog_table() {
        let conn = db();
        let schema = introspect(&conn, "clusters").unwrap().unwrap();
        assert_eq!(schema.columns[0], "id");
        assert!(schema.columns.contains(&"display_name".to_string()));
        assert!(schema.has_updated_at);
    }

    #[test]
    fn missing_table_is_none() {
        let conn = db();
        assert!(introspect(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn upsert_sql_shape() {
        let schema = TableSchema {
            name: "t".into(),
            columns: vec!["id".into(), "body".into()],
            has_updated_at: false,
        };
        assert_eq!(
            schema.upsert_sql(),
            "INSERT OR REPLACE INTO \"t\" (\"id\", \"body\") VALUES (?1, ?2)"
        );
    }

    #[test]
    fn changed_since_uses_strict_comparison() {
        let conn = db();
        conn.execute_batch(
            "INSERT INTO items (id, name, updated_at) VALUES
                (1, 'a', '2026-01-01T10:00:00.000Z'),
                (2, 'b', '2026-01-01 10:30:00'),
                (3, 'c', NULL);",
        )
        .unwrap();
        let since = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(changed_since_count(&conn, "items", since).unwrap(), 1);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let conn = db();
        conn.execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
             INSERT INTO notes VALUES (1, 'alpha'), (2, 'beta');",
        )
        .unwrap();
        let schema = introspect(&conn, "notes").unwrap().unwrap();
        assert!(!schema.has_updated_at);

        let before = local_fingerprint(&conn, &schema).unwrap();
        conn.execute("UPDATE notes SET body = 'betamax' WHERE id = 2", [])
            .unwrap();
        let after = local_fingerprint(&conn, &schema).unwrap();

        assert!(before.starts_with("2:2:"));
        assert_ne!(before, after);
    }

    #[test]
    fn fingerprint_sees_edits_that_keep_length() {
        let conn = db();
        conn.execute_batch(
            "CREATE TABLE flags (id INTEGER PRIMARY KEY, enabled INTEGER, state TEXT);
             INSERT INTO flags VALUES (1, 0, 'open'), (2, 0, 'open');",
        )
        .unwrap();
        let schema = introspect(&conn, "flags").unwrap().unwrap();
        let base = local_fingerprint(&conn, &schema).unwrap();

        conn.execute("UPDATE flags SET enabled = 1 WHERE id = 1", []).unwrap();
        let flipped = local_fingerprint(&conn, &schema).unwrap();
        assert_ne!(base, flipped);

        conn.execute("UPDATE flags SET enabled = 0, state = 'done' WHERE id = 1", [])
            .unwrap();
        let renamed = local_fingerprint(&conn, &schema).unwrap();
        assert_ne!(base, renamed);
        assert_ne!(flipped, renamed);

        // swapping values between rows is not the same content
        conn.execute_batch(
            "UPDATE flags SET state = 'open' WHERE id = 1;
             UPDATE flags SET state = 'done' WHERE id = 2;",
        )
        .unwrap();
        assert_ne!(renamed, local_fingerprint(&conn, &schema).unwrap());

        conn.execute("UPDATE flags SET state = 'open' WHERE id = 2", []).unwrap();
        assert_eq!(base, local_fingerprint(&conn, &schema).unwrap());
    }

    #[test]
    fn empty_table_fingerprint() {
        let conn = db();
        let schema = introspect(&conn, "docs").unwrap().unwrap();
        assert_eq!(local_fingerprint(&conn, &schema).unwrap(), "0:0:0");
    }

    #[test]
    fn cache_invalidation_reloads() {
        let conn = db();
        conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY)").unwrap();
        let cache = SchemaCache::default();
        assert_eq!(cache.get_or_load(&conn, "notes").unwrap().unwrap().columns.len(), 1);

        conn.execute_batch("ALTER TABLE notes ADD COLUMN body TEXT").unwrap();
        assert_eq!(cache.get_or_load(&conn, "notes").unwrap().unwrap().columns.len(), 1);

        cache.invalidate("notes");
        assert_eq!(cache.get_or_load(&conn, "notes").unwrap().unwrap().columns.len(), 2);
    }
}
