//! Change detection: does a table diverge from the remote, and which way?
//!
//! Row counts first, then a local `updated_at` scan, then a content fingerprint for
//! tables without `updated_at`. Wall-clock freshness alone is never trusted.

use tracing::debug;

use super::introspect::{changed_since_count, count_rows, fingerprint_sql, local_fingerprint};
use super::types::{Direction, SyncMetadata};
use super::{SyncCache, SyncResult};
use crate::remote::output::{parse_count, parse_fingerprint};
use crate::remote::quote::quote_ident;
use crate::remote::{CommandOutput, RemoteError};

#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Both sides agree; the counts are worth recording.
    InAgreement { local: i64, remote: i64 },
    NeedsSync {
        direction: Direction,
        local: i64,
        /// `None` when the remote was not counted (bootstrap).
        remote: Option<i64>,
        reason: &'static str,
    },
    /// The remote could not be counted. Local data is used as is.
    RemoteUnknown { local: i64, error: String },
}

impl SyncCache {
    pub async fn detect(&self, table: &str, meta: Option<&SyncMetadata>) -> SyncResult<Detection> {
        let local = self.with_conn(|conn| match self.schemas.get_or_load(conn, table)? {
            Some(schema) => Ok(Some((schema, count_rows(conn, table)?))),
            None => Ok(None),
        })?;

        let Some((schema, local)) = local else {
            return Ok(Detection::NeedsSync {
                direction: Direction::Bootstrap,
                local: 0,
                remote: None,
                reason: "missing_locally",
            });
        };

        let remote = match self.remote_count(table).await {
            Ok(n) => n,
            Err(e) => {
                debug!(table, error = %e, "remote count unavailable, using stale local");
                return Ok(Detection::RemoteUnknown {
                    local,
                    error: e.to_string(),
                });
            }
        };

        if local != remote {
            let direction = if local > remote {
                Direction::Push
            } else {
                Direction::Pull
            };
            return Ok(Detection::NeedsSync {
                direction,
                local,
                remote: Some(remote),
                reason: "count_mismatch",
            });
        }

        let needs = |direction: Direction, reason: &'static str| Detection::NeedsSync {
            direction,
            local,
            remote: Some(remote),
            reason,
        };

        let Some(last_sync) = meta.and_then(|m| m.last_sync_timestamp) else {
            return Ok(needs(Direction::Push, "no_sync_history"));
        };

        if schema.has_updated_at {
            let changed = self.with_conn(|conn| Ok(changed_since_count(conn, table, last_sync)?))?;
            return Ok(if changed > 0 {
                debug!(table, changed, "local rows modified since last sync");
                needs(Direction::Push, "local_changes")
            } else {
                Detection::InAgreement { local, remote }
            });
        }

        let local_fp = self.with_conn(|conn| Ok(local_fingerprint(conn, &schema)?))?;
        let remote_fp = self
            .remote
            .exec(&fingerprint_sql(&schema), self.settings.timeouts.count)
            .await
            .and_then(CommandOutput::check)
            .ok()
            .and_then(|out| parse_fingerprint(&out.stdout));

        Ok(match remote_fp {
            Some(fp) if fp == local_fp => Detection::InAgreement { local, remote },
            Some(_) => needs(self.settings.conflict_policy.resolve_tie(), "content_differs"),
            None => needs(Direction::Push, "fingerprint_unavailable"),
        })
    }

    /// `SELECT COUNT(*)` on the remote with the count timeout.
    pub(crate) async fn remote_count(&self, table: &str) -> Result<i64, RemoteError> {
        let sql = format!("SELECT COUNT(*) FROM {};", quote_ident(table));
        let output = self
            .remote
            .exec(&sql, self.settings.timeouts.count)
            .await?
            .check()?;
        parse_count(&output.stdout).ok_or_else(|| {
            RemoteError::Malformed(format!("no row count in output for {table}"))
        })
    }
}
