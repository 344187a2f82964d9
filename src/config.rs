use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::sync::types::ConflictPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SmartSyncConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    /// `turso_cli` (subprocess) or `http` (libSQL pipeline endpoint).
    pub kind: String,
    /// Remote database name passed to the Turso CLI.
    pub database: String,
    pub cli_path: String,
    pub url: String,
    pub auth_token: Option<String>,
    pub timeouts: RemoteTimeoutsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteTimeoutsConfig {
    pub alive_ms: u64,
    pub count_ms: u64,
    pub exec_ms: u64,
    pub dump_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub base_threshold_minutes: u32,
    pub batch_size: usize,
    /// Per-priority batch sizes, index 0 = priority 1. Missing entries fall back to `batch_size`.
    pub priority_batch_sizes: Vec<usize>,
    pub conflict_policy: ConflictPolicy,
    /// Tables registered at startup so they show up in status before the first query.
    pub tracked_tables: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_smartsync_dir()
            .join("context-memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: "turso_cli".into(),
            database: "context-memory".into(),
            cli_path: "turso".into(),
            url: String::new(),
            auth_token: None,
            timeouts: RemoteTimeoutsConfig::default(),
        }
    }
}

impl Default for RemoteTimeoutsConfig {
    fn default() -> Self {
        Self {
            alive_ms: 5_000,
            count_ms: 10_000,
            exec_ms: 5_000,
            dump_ms: 30_000,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_threshold_minutes: 30,
            batch_size: 10,
            priority_batch_sizes: Vec::new(),
            conflict_policy: ConflictPolicy::LocalWins,
            tracked_tables: vec![
                "docs".into(),
                "clusters".into(),
                "items".into(),
                "child_items".into(),
                "context".into(),
            ],
        }
    }
}

impl RemoteTimeoutsConfig {
    pub fn alive(&self) -> Duration {
        Duration::from_millis(self.alive_ms)
    }

    pub fn count(&self) -> Duration {
        Duration::from_millis(self.count_ms)
    }

    pub fn exec(&self) -> Duration {
        Duration::from_millis(self.exec_ms)
    }

    pub fn dump(&self) -> Duration {
        Duration::from_millis(self.dump_ms)
    }
}

/// Returns `~/.smartsync/`
pub fn default_smartsync_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smartsync")
}

/// Returns the default config file path: `~/.smartsync/config.toml`
pub fn default_config_path() -> PathBuf {
    default_smartsync_dir().join("config.toml")
}

impl SmartSyncConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SmartSyncConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (SMARTSYNC_DB, SMARTSYNC_REMOTE_DB,
    /// SMARTSYNC_REMOTE_URL, SMARTSYNC_REMOTE_TOKEN, SMARTSYNC_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SMARTSYNC_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SMARTSYNC_REMOTE_DB") {
            self.remote.database = val;
        }
        if let Ok(val) = std::env::var("SMARTSYNC_REMOTE_URL") {
            self.remote.url = val;
        }
        if let Ok(val) = std::env::var("SMARTSYNC_REMOTE_TOKEN") {
            self.remote.auth_token = Some(val);
        }
        if let Ok(val) = std::env::var("SMARTSYNC_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
