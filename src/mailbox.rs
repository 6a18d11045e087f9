use crate::error::SyncError;
use crate::models::RawMessage;
use async_trait::async_trait;

/// Candidate filter: any of `subject_keywords` in the subject, received in
/// the last `newer_than_days` days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub subject_keywords: Vec<String>,
    pub newer_than_days: i64,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of matching messages, in the order the server returns them.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>, SyncError>;

    async fn fetch(&self, message_id: &str) -> Result<RawMessage, SyncError>;
}

/// Produces a ready mailbox client, failing when no valid credential exists.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    type Client: Mailbox;

    async fn connect(&self) -> Result<Self::Client, SyncError>;
}
