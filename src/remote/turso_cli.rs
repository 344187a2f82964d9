//! Remote channel driven through the `turso db shell` subprocess.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::output::{filter_dump, parse_count};
use super::{CommandOutput, RemoteChannel, RemoteError};

/// Runs each statement as `turso db shell <database> <sql>`.
///
/// SQL travels as a single argv entry, never through a shell, and rendered literals
/// never contain line breaks, so one call is always one statement.
#[derive(Debug, Clone)]
pub struct TursoCli {
    cli_path: String,
    database: String,
}

impl TursoCli {
    pub fn new(cli_path: &str, database: &str) -> Self {
        Self {
            cli_path: cli_path.to_string(),
            database: database.to_string(),
        }
    }

    async fn shell(&self, argument: &str, limit: Duration) -> Result<CommandOutput, RemoteError> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("db")
            .arg("shell")
            .arg(&self.database)
            .arg(argument)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| {
            RemoteError::Unavailable(format!("failed to spawn {}: {e}", self.cli_path))
        })?;

        // dropping the future on timeout kills the child
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RemoteError::Unavailable(e.to_string())),
            Err(_) => {
                warn!(database = %self.database, ?limit, "turso shell timed out");
                return Err(RemoteError::Timeout(limit));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            database = %self.database,
            exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turso shell finished"
        );

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}

#[async_trait]
impl RemoteChannel for TursoCli {
    async fn exec(&self, sql: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        self.shell(sql, timeout).await
    }

    async fn dump(&self, table: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        let mut output = self.shell(".dump", timeout).await?;
        if output.success() {
            let statements = filter_dump(&output.stdout, table);
            output.stdout = statements
                .iter()
                .map(|stmt| format!("{stmt};\n"))
                .collect();
        }
        Ok(output)
    }

    async fn alive(&self, timeout: Duration) -> bool {
        match self.shell("SELECT 1;", timeout).await {
            Ok(output) => output.success() && parse_count(&output.stdout) == Some(1),
            Err(e) => {
                debug!(error = %e, "liveness probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let cli = TursoCli::new("/nonexistent/turso-binary", "context-memory");
        let err = cli
            .exec("SELECT 1;", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)), "{err:?}");
        assert!(!cli.alive(Duration::from_secs(1)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-turso");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = TursoCli::new(script.to_str().unwrap(), "db");
        let err = cli
            .exec("SELECT 1;", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exec_passes_sql_as_single_argument() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-turso");
        // echoes the fourth argument (the SQL) back
        std::fs::write(&script, "#!/bin/sh\nprintf '%s\\n' \"$4\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let cli = TursoCli::new(script.to_str().unwrap(), "db");
        let out = cli
            .exec("SELECT 'a b; $(x)'", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "SELECT 'a b; $(x)'");
    }
}
