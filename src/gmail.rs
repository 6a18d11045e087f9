use crate::auth::CredentialProvider;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::mailbox::{Mailbox, MailboxProvider, SearchQuery};
use crate::models::RawMessage;
use crate::parts::{self, MessagePart};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_gmail1::Gmail;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct GmailClient {
    hub: Gmail<HttpsConnector<HttpConnector>>,
    call_timeout: Duration,
    page_size: u32,
}

impl GmailClient {
    pub fn new(
        hub: Gmail<HttpsConnector<HttpConnector>>,
        call_timeout: Duration,
        page_size: u32,
    ) -> Self {
        Self {
            hub,
            call_timeout,
            page_size,
        }
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(SyncError::Transport),
            Err(_) => Err(SyncError::Timeout {
                operation,
                after: self.call_timeout,
            }),
        }
    }

    pub async fn list_messages(
        &self,
        query: &str,
        page_token: Option<String>,
    ) -> Result<(Vec<String>, Option<String>)> {
        let mut req = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(self.page_size);

        if let Some(token) = &page_token {
            req = req.page_token(token);
        }

        let (_, message_list) = req.doit().await.context("Failed to list messages")?;

        let ids = message_list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok((ids, message_list.next_page_token))
    }

    pub async fn get_message(&self, id: &str) -> Result<RawMessage> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .doit()
            .await
            .with_context(|| format!("Failed to get message {}", id))?;

        let mut from = None;
        let mut subject = None;

        if let Some(headers) = msg.payload.as_ref().and_then(|p| p.headers.as_ref()) {
            for header in headers {
                let Some(name) = header.name.as_deref() else {
                    continue;
                };
                if name.eq_ignore_ascii_case("From") {
                    from = header.value.clone();
                } else if name.eq_ignore_ascii_case("Subject") {
                    subject = header.value.clone();
                }
            }
        }

        let body_html = msg
            .payload
            .as_ref()
            .and_then(parts::find_body_part)
            .and_then(|part| part.body.as_ref())
            .and_then(|body| body.data.as_deref())
            .map(decode_body)
            .unwrap_or_default();

        let received_at = match msg.internal_date.and_then(DateTime::from_timestamp_millis) {
            Some(at) => at,
            None => {
                warn!(message_id = id, "message has no receipt time, using now");
                Utc::now()
            }
        };

        Ok(RawMessage {
            id: msg.id.unwrap_or_else(|| id.to_string()),
            subject: subject.unwrap_or_default(),
            body_html,
            from_header: from,
            received_at,
        })
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<String>, SyncError> {
        let q = render_query(query);
        let mut ids = Vec::new();
        let mut page_token = None;

        loop {
            let (page, next_page_token) = self
                .timed("message search", self.list_messages(&q, page_token.take()))
                .await?;
            ids.extend(page);
            match next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(query = %q, found = ids.len(), "mailbox search finished");
        Ok(ids)
    }

    async fn fetch(&self, message_id: &str) -> Result<RawMessage, SyncError> {
        self.timed("message fetch", self.get_message(message_id))
            .await
    }
}

impl MessagePart for google_gmail1::api::MessagePart {
    fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    fn children(&self) -> &[Self] {
        self.parts.as_deref().unwrap_or(&[])
    }
}

/// Gmail search syntax for `query`.
pub fn render_query(query: &SearchQuery) -> String {
    let window = format!("newer_than:{}d", query.newer_than_days);
    if query.subject_keywords.is_empty() {
        return window;
    }
    format!("subject:({}) {}", query.subject_keywords.join(" OR "), window)
}

/// The client library has already undone the base64url transport encoding,
/// so body data is the raw part content.
fn decode_body(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Connects to Gmail with the stored credential for the configured identity.
pub struct GmailProvider {
    credentials: CredentialProvider,
    call_timeout: Duration,
    page_size: u32,
}

impl GmailProvider {
    pub fn new(credentials: CredentialProvider, sync: &SyncConfig) -> Self {
        Self {
            credentials,
            call_timeout: sync.call_timeout(),
            page_size: sync.page_size,
        }
    }
}

#[async_trait]
impl MailboxProvider for GmailProvider {
    type Client = GmailClient;

    async fn connect(&self) -> Result<GmailClient, SyncError> {
        let auth = self.credentials.authenticator().await?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| {
                SyncError::Transport(anyhow::Error::new(e).context("Failed to load native roots"))
            })?
            .https_only()
            .enable_http1()
            .build();
        let hub = Gmail::new(hyper::Client::builder().build(connector), auth);

        Ok(GmailClient::new(hub, self.call_timeout, self.page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart as GmailPart, MessagePartBody};

    #[test]
    fn test_render_query() {
        let query = SearchQuery {
            subject_keywords: vec!["interview".into(), "exam".into()],
            newer_than_days: 10,
        };
        assert_eq!(render_query(&query), "subject:(interview OR exam) newer_than:10d");

        let query = SearchQuery {
            subject_keywords: Vec::new(),
            newer_than_days: 3,
        };
        assert_eq!(render_query(&query), "newer_than:3d");
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b"<p>Already decoded</p>"), "<p>Already decoded</p>");
        // Valid base64 that spells "jobs"; must come through untouched.
        assert_eq!(decode_body(b"am9icw"), "am9icw");
    }

    #[test]
    fn test_gmail_parts_pick_nested_html() {
        let html = GmailPart {
            mime_type: Some("text/html".into()),
            body: Some(MessagePartBody {
                data: Some(b"<p>Interview</p>".to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let plain = GmailPart {
            mime_type: Some("text/plain".into()),
            ..Default::default()
        };
        let root = GmailPart {
            mime_type: Some("multipart/alternative".into()),
            parts: Some(vec![plain, html]),
            ..Default::default()
        };

        let part = parts::find_body_part(&root).unwrap();
        assert_eq!(part.mime_type.as_deref(), Some("text/html"));
    }
}
