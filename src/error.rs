use std::time::Duration;
use thiserror::Error;

/// Failures that end a sync cycle. Per-message anomalies never show up here;
/// they are logged and replaced with defaults where they occur.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no credential on file for '{0}', run with --login first")]
    NotAuthenticated(String),

    #[error("token refresh was denied: {0}")]
    RefreshDenied(String),

    #[error("mailbox transport failure: {0:#}")]
    Transport(anyhow::Error),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an event for message {0} already exists")]
    DuplicateMessageId(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
