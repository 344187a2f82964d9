use thiserror::Error;

use crate::remote::RemoteError;

/// Errors raised by the sync cache.
///
/// Remote kinds are recovered inside the query wrapper and only surface from explicit
/// maintenance calls; `QueryFailure` and `Timeout` are what tool callers see.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote rejected command: {0}")]
    RemoteRejected(String),

    /// A local store read or write failed (constraint, disk full, locked).
    #[error("local store error: {0}")]
    LocalIntegrity(String),

    #[error("query '{query_type}' failed: {message}")]
    QueryFailure { query_type: String, message: String },

    #[error("deadline exceeded after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::LocalIntegrity(err.to_string())
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable(_) | RemoteError::Timeout(_) => {
                SyncError::RemoteUnavailable(err.to_string())
            }
            RemoteError::Rejected { .. } | RemoteError::Malformed(_) => {
                SyncError::RemoteRejected(err.to_string())
            }
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SyncError::LocalIntegrity(format!("connection lock poisoned: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn remote_errors_map_by_kind() {
        let unavailable: SyncError = RemoteError::Timeout(Duration::from_secs(10)).into();
        assert!(matches!(unavailable, SyncError::RemoteUnavailable(_)));

        let rejected: SyncError = RemoteError::Rejected {
            exit_code: 1,
            message: "no such table".into(),
        }
        .into();
        assert!(matches!(rejected, SyncError::RemoteRejected(m) if m.contains("no such table")));
    }

    #[test]
    fn sqlite_errors_are_local_integrity() {
        let err: SyncError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, SyncError::LocalIntegrity(_)));
    }
}
