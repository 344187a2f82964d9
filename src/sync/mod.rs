//! Query-triggered sync cache.
//!
//! [`SyncCache`] owns the local connection, the remote channel, the settings, and a
//! clock. Tools hand it the tables they are about to read plus a closure; the cache
//! refreshes whatever is stale (see [`decision`]), runs the closure against the local
//! store, and appends a `query_log` row (see [`wrapper`]).
//!
//! The std mutex around the connection is never held across an `.await`. Remote calls
//! happen between short, synchronous local sections.

pub mod analytics;
pub mod clock;
pub mod decision;
pub mod detect;
pub mod error;
pub mod introspect;
pub mod query_log;
pub mod reconcile;
pub mod registry;
pub mod types;
pub mod wrapper;

pub use error::{SyncError, SyncResult};
pub use wrapper::ResultCount;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::SmartSyncConfig;
use crate::remote::{RemoteChannel, RemoteTimeouts};
use clock::{Clock, SystemClock};
use introspect::SchemaCache;
use types::{ConflictPolicy, PushStrategy, SyncMetadata};

/// Process-wide sync settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub base_threshold_minutes: u32,
    pub batch_size: usize,
    /// Index 0 = priority 1.
    pub priority_batch_sizes: Vec<usize>,
    pub conflict_policy: ConflictPolicy,
    pub timeouts: RemoteTimeouts,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SmartSyncConfig::default())
    }
}

impl SyncSettings {
    pub fn from_config(config: &SmartSyncConfig) -> Self {
        Self {
            base_threshold_minutes: config.sync.base_threshold_minutes,
            batch_size: config.sync.batch_size,
            priority_batch_sizes: config.sync.priority_batch_sizes.clone(),
            conflict_policy: config.sync.conflict_policy,
            timeouts: RemoteTimeouts::from(&config.remote.timeouts),
        }
    }

    /// Rows moved per push or pull for a table of this priority.
    pub fn batch_size_for(&self, priority: u8) -> usize {
        usize::from(priority)
            .checked_sub(1)
            .and_then(|i| self.priority_batch_sizes.get(i).copied())
            .unwrap_or(self.batch_size)
            .max(1)
    }
}

/// Per-table reconciliation locks plus the set of tables currently syncing.
#[derive(Default)]
struct TableLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl TableLocks {
    fn lock_for(&self, table: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => locks.entry(table.to_string()).or_default().clone(),
            // a fresh lock still serializes callers that share it afterwards
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn mark_syncing(&self, table: &str) -> SyncingGuard {
        if let Ok(mut set) = self.in_flight.lock() {
            set.insert(table.to_string());
        }
        SyncingGuard {
            set: Arc::clone(&self.in_flight),
            table: table.to_string(),
        }
    }

    fn syncing(&self) -> HashSet<String> {
        self.in_flight
            .lock()
            .map(|set| set.clone())
            .unwrap_or_default()
    }
}

/// Removes the table from the in-flight set when the sync ends or is cancelled.
struct SyncingGuard {
    set: Arc<Mutex<HashSet<String>>>,
    table: String,
}

impl Drop for SyncingGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.table);
        }
    }
}

pub struct SyncCache {
    db: Arc<Mutex<Connection>>,
    remote: Arc<dyn RemoteChannel>,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
    schemas: SchemaCache,
    locks: TableLocks,
}

impl SyncCache {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        remote: Arc<dyn RemoteChannel>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            db,
            remote,
            settings,
            clock: Arc::new(SystemClock),
            schemas: SchemaCache::default(),
            locks: TableLocks::default(),
        }
    }

    /// Replace the wall clock, e.g. with a [`clock::ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run a synchronous section against the local store.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> SyncResult<T>) -> SyncResult<T> {
        let conn = self.db.lock()?;
        f(&conn)
    }

    /// Tables with a reconciliation in progress.
    pub fn syncing_tables(&self) -> HashSet<String> {
        self.locks.syncing()
    }

    /// Register tables at startup so they appear in status before the first query.
    pub fn register_tracked(&self, tables: &[String]) -> SyncResult<usize> {
        let now = self.now();
        self.with_conn(|conn| {
            let mut created = 0;
            for table in tables {
                if registry::register(
                    conn,
                    table,
                    registry::DEFAULT_PRIORITY,
                    true,
                    PushStrategy::LastN,
                    now,
                )? {
                    created += 1;
                }
            }
            if created > 0 {
                info!(created, "registered tracked tables");
            }
            Ok(created)
        })
    }

    pub fn metadata(&self, table: &str) -> SyncResult<Option<SyncMetadata>> {
        self.with_conn(|conn| registry::get(conn, table))
    }

    pub fn set_priority(&self, table: &str, priority: u8) -> SyncResult<()> {
        let now = self.now();
        self.with_conn(|conn| registry::set_priority(conn, table, priority, now))
    }

    pub fn set_auto(&self, table: &str, enabled: bool) -> SyncResult<()> {
        let now = self.now();
        self.with_conn(|conn| registry::set_auto(conn, table, enabled, now))
    }

    pub fn set_push_strategy(&self, table: &str, strategy: PushStrategy) -> SyncResult<()> {
        let now = self.now();
        self.with_conn(|conn| registry::set_push_strategy(conn, table, strategy, now))
    }
}
