//! Remote channel to the authoritative libSQL database.
//!
//! The [`RemoteChannel`] trait is the only way the sync core reaches the remote store.
//! Every call carries a hard timeout. Two adapters ship with the crate:
//! [`turso_cli::TursoCli`] drives `turso db shell` as a subprocess, and
//! [`http::PipelineHttp`] talks to the libSQL `/v2/pipeline` endpoint. Adapters that
//! cannot bind parameters natively rely on [`quote::render_statement`], the single
//! place where values are inlined into SQL text.

pub mod http;
pub mod output;
pub mod quote;
pub mod turso_cli;

use async_trait::async_trait;
use rusqlite::types::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{RemoteConfig, RemoteTimeoutsConfig};

/// Failure modes of a remote call.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The channel could not be reached (spawn failure, connection refused, I/O).
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote answered but refused the command.
    #[error("remote rejected command (exit {exit_code}): {message}")]
    Rejected { exit_code: i32, message: String },

    #[error("malformed remote output: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// `true` for errors that say nothing about the command itself, only reachability.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Raw result of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`RemoteError::Rejected`].
    pub fn check(self) -> Result<Self, RemoteError> {
        if self.success() {
            return Ok(self);
        }
        let message = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        Err(RemoteError::Rejected {
            exit_code: self.exit_code,
            message,
        })
    }
}

/// A parameterized statement. Placeholders are `?N` (1-based) or bare `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RemoteStatement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Progress of a batch. `applied` statements were acknowledged before `error` (if any).
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub applied: usize,
    pub error: Option<RemoteError>,
}

/// Hard timeouts for each kind of remote call.
#[derive(Debug, Clone, Copy)]
pub struct RemoteTimeouts {
    pub alive: Duration,
    pub count: Duration,
    pub exec: Duration,
    pub dump: Duration,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self::from(&RemoteTimeoutsConfig::default())
    }
}

impl From<&RemoteTimeoutsConfig> for RemoteTimeouts {
    fn from(config: &RemoteTimeoutsConfig) -> Self {
        Self {
            alive: config.alive(),
            count: config.count(),
            exec: config.exec(),
            dump: config.dump(),
        }
    }
}

/// Line-oriented command executor for the remote store.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run one SQL statement and return its textual result set.
    async fn exec(&self, sql: &str, timeout: Duration) -> Result<CommandOutput, RemoteError>;

    /// Emit the schema and rows of `table` as SQL statements.
    async fn dump(&self, table: &str, timeout: Duration) -> Result<CommandOutput, RemoteError>;

    /// Liveness probe. Never errors; anything but a prompt healthy answer is `false`.
    async fn alive(&self, timeout: Duration) -> bool;

    /// Execute statements in order with a per-statement timeout, stopping at the first
    /// failure. The default renders each statement through the quoter and calls
    /// [`exec`](Self::exec).
    async fn exec_batch(&self, statements: &[RemoteStatement], timeout: Duration) -> BatchOutcome {
        let mut applied = 0;
        for statement in statements {
            let sql = match quote::render_statement(statement) {
                Ok(sql) => sql,
                Err(error) => {
                    return BatchOutcome {
                        applied,
                        error: Some(error),
                    }
                }
            };
            if let Err(error) = self
                .exec(&sql, timeout)
                .await
                .and_then(CommandOutput::check)
            {
                return BatchOutcome {
                    applied,
                    error: Some(error),
                };
            }
            applied += 1;
        }
        BatchOutcome {
            applied,
            error: None,
        }
    }
}

/// Build the configured remote channel.
pub fn create_channel(config: &RemoteConfig) -> anyhow::Result<Arc<dyn RemoteChannel>> {
    match config.kind.as_str() {
        "turso_cli" => Ok(Arc::new(turso_cli::TursoCli::new(
            &config.cli_path,
            &config.database,
        ))),
        "http" => {
            anyhow::ensure!(
                !config.url.is_empty(),
                "remote.kind = \"http\" requires remote.url"
            );
            Ok(Arc::new(http::PipelineHttp::new(
                &config.url,
                config.auth_token.clone(),
            )?))
        }
        other => anyhow::bail!("unknown remote kind: {other}. Supported: turso_cli, http"),
    }
}
