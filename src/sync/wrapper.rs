//! The query wrapper: the single entry point every tool goes through.
//!
//! `decide -> (probe -> detect -> reconcile)* -> action -> query_log`. Remote failures
//! are recovered here and recorded in the log entry's `user_context`. Only action
//! failures and deadline hits reach the caller.

use rusqlite::Connection;
use serde_json::{json, Map, Value as JsonValue};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::decision::{needs_refresh, select_tables};
use super::detect::Detection;
use super::query_log::{append, NewQueryLog};
use super::registry;
use super::types::ReconcileOutcome;
use super::{SyncCache, SyncError, SyncResult};
use crate::remote::RemoteTimeouts;

/// Number of results a tool call produced, for `query_result_count`.
pub trait ResultCount {
    fn result_count(&self) -> u64 {
        1
    }
}

impl<T> ResultCount for Vec<T> {
    fn result_count(&self) -> u64 {
        self.len() as u64
    }
}

impl<T> ResultCount for Option<T> {
    fn result_count(&self) -> u64 {
        u64::from(self.is_some())
    }
}

impl ResultCount for JsonValue {
    fn result_count(&self) -> u64 {
        match self {
            JsonValue::Null => 0,
            JsonValue::Array(items) => items.len() as u64,
            _ => 1,
        }
    }
}

/// What happened to one table during the pre-query sync.
#[derive(Debug, Clone)]
pub enum TableSync {
    /// A concurrent caller refreshed it first.
    AlreadyFresh,
    /// Both sides agreed; counts recorded.
    Verified { local: i64, remote: i64 },
    Reconciled(ReconcileOutcome),
    /// Remote count unavailable; local data used as is.
    RemoteUnknown(String),
    /// Local error before reconciliation could start.
    Failed(String),
}

/// Sync bookkeeping accumulated for one wrapped call.
#[derive(Debug, Default)]
struct CallReport {
    triggered: bool,
    duration_ms: u64,
    session_id: Option<String>,
    note: Option<&'static str>,
    synced: Vec<String>,
    failed: Vec<JsonValue>,
    stale: Vec<String>,
    error: Option<String>,
}

impl CallReport {
    fn record(&mut self, table: &str, result: &TableSync) {
        match result {
            TableSync::AlreadyFresh => {}
            TableSync::Verified { .. } => self.synced.push(table.to_string()),
            TableSync::Reconciled(outcome) if outcome.success => {
                self.synced.push(table.to_string())
            }
            TableSync::Reconciled(outcome) => {
                self.stale.push(table.to_string());
                self.failed.push(json!({
                    "table": table,
                    "direction": outcome.direction,
                    "error": outcome.error,
                }));
            }
            TableSync::RemoteUnknown(error) | TableSync::Failed(error) => {
                self.stale.push(table.to_string());
                self.failed.push(json!({ "table": table, "error": error }));
            }
        }
    }

    fn user_context(&self) -> Option<JsonValue> {
        let mut context = Map::new();
        if let Some(session_id) = &self.session_id {
            context.insert("session_id".into(), json!(session_id));
        }
        if let Some(note) = self.note {
            context.insert("note".into(), json!(note));
        }
        if !self.synced.is_empty() {
            context.insert("synced".into(), json!(self.synced));
        }
        if !self.failed.is_empty() {
            context.insert("failed".into(), JsonValue::Array(self.failed.clone()));
        }
        if !self.stale.is_empty() {
            context.insert("stale_tables".into(), json!(self.stale));
        }
        if let Some(error) = &self.error {
            context.insert("error".into(), json!(error));
        }
        (!context.is_empty()).then_some(JsonValue::Object(context))
    }
}

fn dedup(tables: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tables.len());
    for table in tables {
        if !out.iter().any(|t| t == table) {
            out.push((*table).to_string());
        }
    }
    out
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Worst case for a pre-query sync: one probe plus one remote count per table.
fn deadline_budget(timeouts: &RemoteTimeouts, tables: usize) -> Duration {
    let per_table = timeouts
        .count
        .saturating_mul(u32::try_from(tables).unwrap_or(u32::MAX));
    timeouts.alive.saturating_add(per_table)
}

impl SyncCache {
    /// Refresh whatever `tables` need, run `action` against the local store, log the call.
    pub async fn run<T, F>(&self, query_type: &str, tables: &[&str], action: F) -> SyncResult<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send,
        T: ResultCount + Send,
    {
        self.run_with_deadline(query_type, tables, None, action)
            .await
    }

    /// Like [`run`](Self::run), bounded by an overall deadline.
    ///
    /// If the remaining time cannot cover the worst-case sync (liveness probe plus one
    /// count per table) the sync is skipped and `action` runs on local data. If the
    /// deadline fires while a sync is in progress the call fails with
    /// [`SyncError::Timeout`] and `action` is skipped.
    pub async fn run_with_deadline<T, F>(
        &self,
        query_type: &str,
        tables: &[&str],
        deadline: Option<Duration>,
        action: F,
    ) -> SyncResult<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send,
        T: ResultCount + Send,
    {
        let start = Instant::now();
        let deadline = deadline.map(|d| start + d);
        let tables = dedup(tables);

        let now = self.now();
        let snapshot = self.with_conn(|conn| registry::get_many(conn, &tables))?;
        let to_sync = select_tables(&tables, &snapshot, now, self.settings.base_threshold_minutes);

        let mut report = CallReport::default();
        if !to_sync.is_empty() {
            report.triggered = true;
            if let Err(err) = self.pre_sync(&to_sync, deadline, &mut report).await {
                report.duration_ms = elapsed_ms(start);
                report.error = Some(err.to_string());
                self.log_call(query_type, &tables, &report, 0)?;
                warn!(query_type, error = %err, "sync aborted by deadline");
                return Err(err);
            }
        }

        let at = self.now();
        let conn = self.db.lock()?;
        match action(&conn) {
            Ok(value) => {
                let count = value.result_count();
                for table in &tables {
                    registry::touch(&conn, table, at)?;
                }
                let id = append(
                    &conn,
                    &NewQueryLog {
                        query_type,
                        tables: &tables,
                        sync_triggered: report.triggered,
                        sync_duration_ms: report.duration_ms,
                        result_count: count,
                        at,
                        user_context: report.user_context().as_ref(),
                    },
                )?;
                debug!(
                    query_type,
                    log_id = id,
                    results = count,
                    sync_triggered = report.triggered,
                    sync_ms = report.duration_ms,
                    "query completed"
                );
                Ok(value)
            }
            Err(err) => {
                let message = format!("{err:#}");
                report.error = Some(message.clone());
                append(
                    &conn,
                    &NewQueryLog {
                        query_type,
                        tables: &tables,
                        sync_triggered: report.triggered,
                        sync_duration_ms: report.duration_ms,
                        result_count: 0,
                        at,
                        user_context: report.user_context().as_ref(),
                    },
                )?;
                warn!(query_type, error = %message, "query failed");
                Err(SyncError::QueryFailure {
                    query_type: query_type.to_string(),
                    message,
                })
            }
        }
    }

    fn log_call(
        &self,
        query_type: &str,
        tables: &[String],
        report: &CallReport,
        result_count: u64,
    ) -> SyncResult<i64> {
        let at = self.now();
        let context = report.user_context();
        self.with_conn(|conn| {
            append(
                conn,
                &NewQueryLog {
                    query_type,
                    tables,
                    sync_triggered: report.triggered,
                    sync_duration_ms: report.duration_ms,
                    result_count,
                    at,
                    user_context: context.as_ref(),
                },
            )
        })
    }

    /// Probe, then detect and reconcile each table in order. Only a deadline hit is an error.
    async fn pre_sync(
        &self,
        to_sync: &[String],
        deadline: Option<Instant>,
        report: &mut CallReport,
    ) -> SyncResult<()> {
        let timeouts = self.settings.timeouts;

        if let Some(deadline) = deadline {
            let budget = deadline_budget(&timeouts, to_sync.len());
            if deadline.saturating_duration_since(Instant::now()) < budget {
                info!(tables = ?to_sync, "not enough time left to sync, using local data");
                report.note = Some("deadline_skip");
                report.stale = to_sync.to_vec();
                return Ok(());
            }
        }

        let sync_start = Instant::now();
        if !self.remote.alive(timeouts.alive).await {
            warn!(tables = ?to_sync, "remote offline, using local data");
            report.note = Some("remote_offline");
            report.stale = to_sync.to_vec();
            report.duration_ms = 0;
            return Ok(());
        }

        let session_id = uuid::Uuid::now_v7().to_string();
        report.session_id = Some(session_id.clone());

        let work = async {
            for table in to_sync {
                let result = self.sync_table_with(table, &session_id, false).await;
                report.record(table, &result);
            }
        };

        match deadline {
            Some(deadline) => {
                let limit = tokio::time::Instant::from_std(deadline);
                if tokio::time::timeout_at(limit, work).await.is_err() {
                    return Err(SyncError::Timeout {
                        elapsed_ms: elapsed_ms(sync_start),
                    });
                }
            }
            None => work.await,
        }

        report.duration_ms = elapsed_ms(sync_start);
        Ok(())
    }

    /// Reconcile one table now, regardless of freshness. Probes the remote first.
    pub async fn sync_table(&self, table: &str) -> TableSync {
        if !self.remote.alive(self.settings.timeouts.alive).await {
            return TableSync::RemoteUnknown("remote offline".into());
        }
        let session_id = uuid::Uuid::now_v7().to_string();
        self.sync_table_with(table, &session_id, true).await
    }

    async fn sync_table_with(&self, table: &str, session_id: &str, force: bool) -> TableSync {
        let lock = self.locks.lock_for(table);
        let _held = lock.lock().await;

        let meta = match self.metadata(table) {
            Ok(meta) => meta,
            Err(e) => return TableSync::Failed(e.to_string()),
        };
        if !force && !needs_refresh(meta.as_ref(), self.now(), self.settings.base_threshold_minutes)
        {
            debug!(table, "refreshed by a concurrent call, skipping");
            return TableSync::AlreadyFresh;
        }

        let _syncing = self.locks.mark_syncing(table);
        match self.detect(table, meta.as_ref()).await {
            Ok(Detection::InAgreement { local, remote }) => {
                let at = self.now();
                match self.with_conn(|conn| registry::record_sync(conn, table, local, remote, at)) {
                    Ok(()) => TableSync::Verified { local, remote },
                    Err(e) => TableSync::Failed(e.to_string()),
                }
            }
            Ok(Detection::NeedsSync {
                direction,
                remote,
                reason,
                ..
            }) => {
                debug!(table, %direction, reason, "table needs sync");
                let outcome = self
                    .reconcile(table, direction, meta.as_ref(), remote, session_id)
                    .await;
                TableSync::Reconciled(outcome)
            }
            Ok(Detection::RemoteUnknown { error, .. }) => TableSync::RemoteUnknown(error),
            Err(e) => {
                warn!(table, error = %e, "change detection failed");
                TableSync::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_counts() {
        assert_eq!(vec![1, 2, 3].result_count(), 3);
        assert_eq!(Some(5).result_count(), 1);
        assert_eq!(None::<i32>.result_count(), 0);
        assert_eq!(json!([1, 2]).result_count(), 2);
        assert_eq!(JsonValue::Null.result_count(), 0);
        assert_eq!(json!({ "a": 1 }).result_count(), 1);
    }

    #[test]
    fn deadline_budget_counts_every_table() {
        let timeouts = RemoteTimeouts::default();
        assert_eq!(deadline_budget(&timeouts, 0), timeouts.alive);
        assert_eq!(
            deadline_budget(&timeouts, 3),
            timeouts.alive + timeouts.count * 3
        );
        // a table count beyond u32 clamps instead of wrapping
        assert_eq!(
            deadline_budget(&timeouts, usize::MAX),
            timeouts.alive + timeouts.count * u32::MAX
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        assert_eq!(dedup(&["docs", "clusters", "docs"]), vec!["docs", "clusters"]);
    }

    #[test]
    fn empty_report_has_no_context() {
        assert!(CallReport::default().user_context().is_none());
    }

    #[test]
    fn offline_report_context() {
        let report = CallReport {
            triggered: true,
            note: Some("remote_offline"),
            stale: vec!["docs".into()],
            ..CallReport::default()
        };
        let context = report.user_context().unwrap();
        assert_eq!(context["note"], "remote_offline");
        assert_eq!(context["stale_tables"], json!(["docs"]));
    }
}
