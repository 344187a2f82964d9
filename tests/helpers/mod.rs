#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::Connection;
use smartsync::db;
use smartsync::remote::quote::{quote_ident, quote_literal};
use smartsync::remote::{CommandOutput, RemoteChannel, RemoteError};
use smartsync::sync::clock::ManualClock;
use smartsync::sync::{SyncCache, SyncSettings};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Open a fresh in-memory database with schema, catalog, and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Fixed starting point for the manual clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

/// Remote channel backed by a second SQLite connection.
///
/// SELECT results come back the way `turso db shell` prints them: one line per row,
/// cells joined by `|`. SQL errors become a non-zero exit with the message on stderr.
pub struct FakeRemote {
    pub conn: Mutex<Connection>,
    alive: AtomicBool,
    latency: Mutex<Duration>,
    pub probes: AtomicUsize,
    pub execs: AtomicUsize,
    pub dumps: AtomicUsize,
}

impl FakeRemote {
    /// A reachable remote with the same catalog schema as the local store.
    pub fn new() -> Arc<Self> {
        Self::with_conn(test_db())
    }

    pub fn with_conn(conn: Connection) -> Arc<Self> {
        Arc::new(Self {
            conn: Mutex::new(conn),
            alive: AtomicBool::new(true),
            latency: Mutex::new(Duration::ZERO),
            probes: AtomicUsize::new(0),
            execs: AtomicUsize::new(0),
            dumps: AtomicUsize::new(0),
        })
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Delay applied to every `exec` before it answers.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    /// Run SQL directly against the remote database (test setup).
    pub fn seed(&self, sql: &str) {
        self.conn.lock().unwrap().execute_batch(sql).unwrap();
    }

    pub fn count(&self, table: &str) -> i64 {
        count(&self.conn.lock().unwrap(), table)
    }

    fn run_sql(&self, sql: &str) -> CommandOutput {
        let conn = self.conn.lock().unwrap();
        match render_rows(&conn, sql) {
            Ok(stdout) => CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            },
            Err(e) => CommandOutput {
                stdout: String::new(),
                stderr: format!("Error: {e}"),
                exit_code: 1,
            },
        }
    }

    fn dump_table(&self, table: &str) -> rusqlite::Result<String> {
        let conn = self.conn.lock().unwrap();
        let create: String = conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        let mut out = format!("PRAGMA foreign_keys=OFF;\nBEGIN TRANSACTION;\n{create};\n");

        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(table)))?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for row in rows {
            let values = row
                .iter()
                .map(|v| quote_literal(v).unwrap())
                .collect::<Vec<_>>()
                .join(",");
            out.push_str(&format!("INSERT INTO {} VALUES({values});\n", quote_ident(table)));
        }
        out.push_str("COMMIT;\n");
        Ok(out)
    }
}

fn render_rows(conn: &Connection, sql: &str) -> rusqlite::Result<String> {
    let mut stmt = conn.prepare(sql)?;
    let width = stmt.column_count();
    if width == 0 {
        stmt.execute([])?;
        return Ok(String::new());
    }
    let mut rows = stmt.query([])?;
    let mut out = String::new();
    while let Some(row) = rows.next()? {
        let cells = (0..width)
            .map(|i| {
                Ok(match row.get::<_, Value>(i)? {
                    Value::Null => String::new(),
                    Value::Integer(n) => n.to_string(),
                    Value::Real(f) => f.to_string(),
                    Value::Text(s) => s,
                    Value::Blob(b) => format!("<{} bytes>", b.len()),
                })
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;
        out.push_str(&cells.join("|"));
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl RemoteChannel for FakeRemote {
    async fn exec(&self, sql: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        if !self.alive.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("connection refused".into()));
        }
        let latency = *self.latency.lock().unwrap();
        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(RemoteError::Timeout(timeout));
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(self.run_sql(sql))
    }

    async fn dump(&self, table: &str, _timeout: Duration) -> Result<CommandOutput, RemoteError> {
        self.dumps.fetch_add(1, Ordering::SeqCst);
        if !self.alive.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("connection refused".into()));
        }
        Ok(match self.dump_table(table) {
            Ok(stdout) => CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: 0,
            },
            Err(e) => CommandOutput {
                stdout: String::new(),
                stderr: format!("Error: {e}"),
                exit_code: 1,
            },
        })
    }

    async fn alive(&self, _timeout: Duration) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }
}

/// A cache over a fresh local store, the given remote, and a manual clock at [`t0`].
pub fn test_cache(remote: Arc<FakeRemote>) -> (SyncCache, Arc<ManualClock>) {
    test_cache_with(test_db(), remote, SyncSettings::default())
}

pub fn test_cache_with(
    local: Connection,
    remote: Arc<FakeRemote>,
    settings: SyncSettings,
) -> (SyncCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let cache = SyncCache::new(Arc::new(Mutex::new(local)), remote, settings)
        .with_clock(clock.clone());
    (cache, clock)
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |row| {
        row.get(0)
    })
    .unwrap()
}

/// `n` active docs with ids starting at `first_id`, stamped `updated_at`.
pub fn docs_sql(first_id: i64, n: i64, updated_at: DateTime<Utc>) -> String {
    let stamp = smartsync::sync::clock::format_timestamp(updated_at);
    (first_id..first_id + n)
        .map(|id| {
            format!(
                "INSERT INTO docs (id, title, summary, keywords, cluster_name, quality_score, \
                 relevance_score, updated_at) VALUES ({id}, 'Doc {id}', 'about anything', \
                 'sync', 'turso', 8.0, 7.5, '{stamp}');"
            )
        })
        .collect()
}

/// Query log rows as `(id, query_type, sync_triggered, sync_duration_ms, result_count, user_context)`.
pub fn query_log(cache: &SyncCache) -> Vec<(i64, String, bool, i64, i64, Option<serde_json::Value>)> {
    cache
        .with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, query_type, sync_triggered, sync_duration_ms, query_result_count,
                        user_context
                 FROM query_log ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let context: Option<String> = row.get(5)?;
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        context.map(|c| serde_json::from_str(&c).unwrap()),
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap()
}

pub fn minutes(n: i64) -> TimeDelta {
    TimeDelta::minutes(n)
}
