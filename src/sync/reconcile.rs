//! Push, pull, and bootstrap of a single table.
//!
//! Each primitive returns a [`ReconcileOutcome`] rather than an error, appends one
//! `sync_log` row, and only touches the freshness registry on success. A failed push
//! leaves local state untouched; a failed pull or bootstrap rolls back its local
//! transaction.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn};

use super::clock::format_timestamp;
use super::error::SyncError;
use super::introspect::{count_rows, TableSchema};
use super::query_log::append_sync_log;
use super::registry::{self, DEFAULT_PRIORITY};
use super::types::{Direction, PushStrategy, ReconcileOutcome, SyncMetadata};
use super::SyncCache;
use crate::remote::output::{classify, filter_dump, parse_json_rows, DumpStatement};
use crate::remote::quote::quote_ident;
use crate::remote::{RemoteError, RemoteStatement};

/// A failed attempt and how far it got.
struct Failure {
    rows_moved: usize,
    error: SyncError,
}

impl From<SyncError> for Failure {
    fn from(error: SyncError) -> Self {
        Self {
            rows_moved: 0,
            error,
        }
    }
}

impl From<RemoteError> for Failure {
    fn from(error: RemoteError) -> Self {
        SyncError::from(error).into()
    }
}

impl From<rusqlite::Error> for Failure {
    fn from(error: rusqlite::Error) -> Self {
        SyncError::from(error).into()
    }
}

/// Local rows to push, oldest id first.
///
/// With a prior sync and an `updated_at` column, `last_n` also carries every row
/// changed since that sync, so an edit outside the newest N ids still reaches the
/// remote before `last_sync` moves past it.
fn select_for_push(
    conn: &Connection,
    schema: &TableSchema,
    strategy: PushStrategy,
    last_sync: Option<DateTime<Utc>>,
    limit: usize,
) -> rusqlite::Result<Vec<Vec<Value>>> {
    let table = quote_ident(&schema.name);
    let columns = schema.column_list();

    let (sql, args, newest_first): (String, Vec<Value>, bool) =
        match (strategy, last_sync, schema.has_updated_at) {
            (PushStrategy::ChangedSince, Some(since), true) => (
                format!(
                    "SELECT {columns} FROM {table} \
                     WHERE julianday(updated_at) > julianday(?1) ORDER BY \"id\""
                ),
                vec![Value::Text(format_timestamp(since))],
                false,
            ),
            (PushStrategy::LastN, Some(since), true) => (
                format!(
                    "SELECT {columns} FROM {table} \
                     WHERE \"id\" IN (SELECT \"id\" FROM {table} ORDER BY \"id\" DESC LIMIT ?1) \
                        OR julianday(updated_at) > julianday(?2) \
                     ORDER BY \"id\""
                ),
                vec![
                    Value::Integer(limit as i64),
                    Value::Text(format_timestamp(since)),
                ],
                false,
            ),
            (PushStrategy::Full, _, _) => {
                (format!("SELECT {columns} FROM {table} ORDER BY \"id\""), vec![], false)
            }
            // last_n, and changed_since without history or without updated_at
            _ => (
                format!("SELECT {columns} FROM {table} ORDER BY \"id\" DESC LIMIT ?1"),
                vec![Value::Integer(limit as i64)],
                true,
            ),
        };

    let width = schema.columns.len();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(params_from_iter(args), |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if newest_first {
        rows.reverse();
    }
    Ok(rows)
}

/// `SELECT json_group_array(json_object(...))` over the latest `limit` rows.
fn pull_sql(schema: &TableSchema, limit: usize) -> String {
    let pairs = schema
        .columns
        .iter()
        .map(|c| format!("'{}', {}", c.replace('\'', "''"), quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT json_group_array(json_object({pairs})) FROM \
         (SELECT * FROM {} ORDER BY \"id\" DESC LIMIT {limit});",
        quote_ident(&schema.name)
    )
}

fn json_to_value(value: Option<&JsonValue>) -> Value {
    match value {
        None | Some(JsonValue::Null) => Value::Null,
        Some(JsonValue::Bool(b)) => Value::Integer(i64::from(*b)),
        Some(JsonValue::Number(n)) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map(Value::Real).unwrap_or(Value::Null),
        },
        Some(JsonValue::String(s)) => Value::Text(s.clone()),
        Some(other) => Value::Text(other.to_string()),
    }
}

fn apply_rows(
    conn: &Connection,
    schema: &TableSchema,
    rows: &[Map<String, JsonValue>],
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(&schema.upsert_sql())?;
        for row in rows {
            let values = schema.columns.iter().map(|c| json_to_value(row.get(c)));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()
}

impl SyncCache {
    /// Run one primitive and log it. Never fails.
    pub async fn reconcile(
        &self,
        table: &str,
        direction: Direction,
        meta: Option<&SyncMetadata>,
        remote_count: Option<i64>,
        session_id: &str,
    ) -> ReconcileOutcome {
        let attempt = match direction {
            Direction::Push => self.push(table, meta, remote_count).await,
            Direction::Pull => self.pull(table, meta, remote_count).await,
            Direction::Bootstrap => self.bootstrap(table).await,
        };

        let outcome = match attempt {
            Ok(rows) => {
                info!(table, %direction, rows, "reconciled");
                ReconcileOutcome::ok(table, direction, rows)
            }
            Err(failure) => {
                warn!(
                    table,
                    %direction,
                    rows = failure.rows_moved,
                    error = %failure.error,
                    "reconciliation failed"
                );
                ReconcileOutcome::failed(
                    table,
                    direction,
                    failure.rows_moved,
                    failure.error.to_string(),
                )
            }
        };

        let at = self.now();
        let tables = [table.to_string()];
        let logged = self.with_conn(|conn| {
            append_sync_log(
                conn,
                session_id,
                direction,
                &tables,
                outcome.rows_moved,
                outcome.success,
                outcome.error.as_deref(),
                at,
            )
        });
        if let Err(e) = logged {
            warn!(table, error = %e, "failed to append sync log");
        }

        outcome
    }

    async fn push(
        &self,
        table: &str,
        meta: Option<&SyncMetadata>,
        detected_remote: Option<i64>,
    ) -> Result<usize, Failure> {
        let priority = meta.map_or(DEFAULT_PRIORITY, |m| m.sync_priority);
        let strategy = meta.map(|m| m.push_strategy).unwrap_or_default();
        let last_sync = meta.and_then(|m| m.last_sync_timestamp);
        let limit = self.settings.batch_size_for(priority);

        let (statements, local_count) = self.with_conn(|conn| {
            let schema = self.schemas.get_or_load(conn, table)?.ok_or_else(|| {
                SyncError::LocalIntegrity(format!("table {table} does not exist locally"))
            })?;
            let upsert = schema.upsert_sql();
            let statements: Vec<RemoteStatement> =
                select_for_push(conn, &schema, strategy, last_sync, limit)?
                    .into_iter()
                    .map(|values| RemoteStatement::new(upsert.clone(), values))
                    .collect();
            Ok((statements, count_rows(conn, table)?))
        })?;

        let batch = self
            .remote
            .exec_batch(&statements, self.settings.timeouts.exec)
            .await;
        if let Some(error) = batch.error {
            return Err(Failure {
                rows_moved: batch.applied,
                error: error.into(),
            });
        }

        let remote_after = match self.remote_count(table).await {
            Ok(n) => n,
            Err(e) => {
                warn!(table, error = %e, "remote recount after push failed");
                detected_remote.unwrap_or(0)
            }
        };

        let at = self.now();
        self.with_conn(|conn| registry::record_sync(conn, table, local_count, remote_after, at))?;
        Ok(statements.len())
    }

    async fn pull(
        &self,
        table: &str,
        meta: Option<&SyncMetadata>,
        detected_remote: Option<i64>,
    ) -> Result<usize, Failure> {
        let priority = meta.map_or(DEFAULT_PRIORITY, |m| m.sync_priority);
        let limit = self.settings.batch_size_for(priority);

        let schema = self
            .with_conn(|conn| Ok(self.schemas.get_or_load(conn, table)?))?
            .ok_or_else(|| {
                SyncError::LocalIntegrity(format!("table {table} does not exist locally"))
            })?;

        let output = self
            .remote
            .exec(&pull_sql(&schema, limit), self.settings.timeouts.exec)
            .await?
            .check()?;
        let rows = parse_json_rows(&output.stdout)?;

        let at = self.now();
        self.with_conn(|conn| {
            apply_rows(conn, &schema, &rows)?;
            let local_after = count_rows(conn, table)?;
            registry::record_sync(
                conn,
                table,
                local_after,
                detected_remote.unwrap_or(local_after),
                at,
            )
        })?;
        Ok(rows.len())
    }

    /// Full copy of a table that does not exist locally, from the remote dump.
    async fn bootstrap(&self, table: &str) -> Result<usize, Failure> {
        let output = self
            .remote
            .dump(table, self.settings.timeouts.dump)
            .await?
            .check()?;
        let statements = filter_dump(&output.stdout, table);

        let has_create = statements
            .iter()
            .any(|s| matches!(classify(s), Some(DumpStatement::CreateTable(_))));
        if !has_create {
            return Err(SyncError::RemoteRejected(format!(
                "remote dump has no CREATE TABLE for {table}"
            ))
            .into());
        }
        let inserts = statements
            .iter()
            .filter(|s| matches!(classify(s), Some(DumpStatement::Insert(_))))
            .count();

        let at = self.now();
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for statement in &statements {
                tx.execute(statement, [])?;
            }
            tx.commit()?;
            self.schemas.invalidate(table);

            let local = count_rows(conn, table)?;
            registry::record_sync(conn, table, local, local, at)
        })?;
        Ok(inserts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schema() -> TableSchema {
        TableSchema {
            name: "docs".into(),
            columns: vec!["id".into(), "title".into(), "updated_at".into()],
            has_updated_at: true,
        }
    }

    #[test]
    fn pull_sql_shape() {
        assert_eq!(
            pull_sql(&schema(), 10),
            "SELECT json_group_array(json_object('id', \"id\", 'title', \"title\", \
             'updated_at', \"updated_at\")) FROM (SELECT * FROM \"docs\" ORDER BY \"id\" DESC LIMIT 10);"
        );
    }

    #[test]
    fn json_values_map_to_sqlite() {
        assert_eq!(json_to_value(None), Value::Null);
        assert_eq!(json_to_value(Some(&JsonValue::Bool(true))), Value::Integer(1));
        assert_eq!(json_to_value(Some(&serde_json::json!(42))), Value::Integer(42));
        assert_eq!(json_to_value(Some(&serde_json::json!(4.5))), Value::Real(4.5));
        assert_eq!(
            json_to_value(Some(&serde_json::json!(["a"]))),
            Value::Text("[\"a\"]".into())
        );
    }

    #[test]
    fn push_selection_strategies() {
        let conn = crate::db::open_memory_database().unwrap();
        conn.execute_batch(
            "INSERT INTO docs (id, title, updated_at) VALUES
                (1, 'a', '2026-01-01T00:00:00.000Z'),
                (2, 'b', '2026-01-03T00:00:00.000Z'),
                (3, 'c', '2026-01-05T00:00:00.000Z');",
        )
        .unwrap();
        let schema = crate::sync::introspect::introspect(&conn, "docs").unwrap().unwrap();
        let id_of = |rows: &[Vec<Value>]| -> Vec<Value> { rows.iter().map(|r| r[0].clone()).collect() };

        let last_two = select_for_push(&conn, &schema, PushStrategy::LastN, None, 2).unwrap();
        assert_eq!(id_of(&last_two), vec![Value::Integer(2), Value::Integer(3)]);

        let since = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let changed =
            select_for_push(&conn, &schema, PushStrategy::ChangedSince, Some(since), 1).unwrap();
        assert_eq!(id_of(&changed), vec![Value::Integer(2), Value::Integer(3)]);

        let no_history =
            select_for_push(&conn, &schema, PushStrategy::ChangedSince, None, 1).unwrap();
        assert_eq!(id_of(&no_history), vec![Value::Integer(3)]);

        // id 1 is outside the newest two but changed after the sync
        conn.execute(
            "UPDATE docs SET updated_at = '2026-01-06T00:00:00.000Z' WHERE id = 1",
            [],
        )
        .unwrap();
        let since_last = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let with_edits =
            select_for_push(&conn, &schema, PushStrategy::LastN, Some(since_last), 2).unwrap();
        assert_eq!(
            id_of(&with_edits),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );

        let full = select_for_push(&conn, &schema, PushStrategy::Full, None, 1).unwrap();
        assert_eq!(full.len(), 3);
        assert_eq!(full[0].len(), schema.columns.len());
    }

    #[test]
    fn applied_rows_replace_existing() {
        let conn = crate::db::open_memory_database().unwrap();
        conn.execute("INSERT INTO clusters (id, name) VALUES (1, 'old')", [])
            .unwrap();
        let schema = crate::sync::introspect::introspect(&conn, "clusters").unwrap().unwrap();
        let rows = parse_json_rows(r#"[{"id":1,"name":"new"},{"id":2,"name":"other"}]"#).unwrap();

        apply_rows(&conn, &schema, &rows).unwrap();

        let name: String = conn
            .query_row("SELECT name FROM clusters WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "new");
        assert_eq!(count_rows(&conn, "clusters").unwrap(), 2);
    }
}
