use crate::config::SyncConfig;
use crate::dates::{self, AmbiguousDates};
use crate::db::Database;
use crate::error::{StoreError, SyncError};
use crate::mailbox::{Mailbox, MailboxProvider, SearchQuery};
use crate::models::{Category, NewEvent, RawMessage};
use crate::{parser, sender};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub expired_purged: u64,
    pub legacy_purged: u64,
    pub candidates: usize,
    pub skipped: usize,
    pub inserted: usize,
    /// Inserted events dated by receipt time because no usable date was found.
    pub fallback_dated: usize,
}

/// Scheduler-visible state of the sync loop.
#[derive(Debug, Default)]
pub struct SyncState {
    pub running: bool,
    pub cycles: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_report: Option<SyncReport>,
    pub last_error: Option<String>,
}

impl SyncState {
    /// Claims the state for a new cycle; false if one is already running.
    pub fn try_begin(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.last_started = Some(Utc::now());
        true
    }

    pub fn finish(&mut self, result: &Result<SyncReport, SyncError>) {
        self.running = false;
        self.cycles += 1;
        self.last_finished = Some(Utc::now());
        match result {
            Ok(report) => {
                self.last_report = Some(report.clone());
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }
}

/// Runs sync cycles: purge, search, and turn each unseen message into an event.
pub struct Syncer<P> {
    db: Database,
    provider: P,
    config: SyncConfig,
    ambiguous: AmbiguousDates,
}

impl<P: MailboxProvider> Syncer<P> {
    pub fn new(db: Database, provider: P, config: SyncConfig, ambiguous: AmbiguousDates) -> Self {
        Self {
            db,
            provider,
            config,
            ambiguous,
        }
    }

    /// One full cycle, bounded by the configured cycle timeout. Events stored
    /// before a failure stay stored.
    pub async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        let limit = self.config.cycle_timeout();
        match tokio::time::timeout(limit, self.run_phases()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation: "sync cycle",
                after: limit,
            }),
        }
    }

    fn query(&self) -> SearchQuery {
        SearchQuery {
            subject_keywords: self.config.keywords.clone(),
            newer_than_days: self.config.retention_days,
        }
    }

    async fn run_phases(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let cutoff = Utc::now() - self.config.retention();
        report.expired_purged = self.db.delete_older_than(cutoff).await?;
        report.legacy_purged = self.db.delete_without_message_id().await?;
        debug!(
            expired = report.expired_purged,
            legacy = report.legacy_purged,
            "purged stale events"
        );

        let mailbox = self.provider.connect().await?;
        let ids = mailbox.search(&self.query()).await?;
        report.candidates = ids.len();
        if ids.is_empty() {
            info!("no candidate messages in the search window");
            return Ok(report);
        }

        for id in &ids {
            if self.db.event_exists(id).await? {
                report.skipped += 1;
                continue;
            }

            let message = mailbox.fetch(id).await?;
            let (event, used_fallback) = build_event(&message, self.ambiguous);

            match self.db.insert_event(&event).await {
                Ok(event_id) => {
                    report.inserted += 1;
                    if used_fallback {
                        report.fallback_dated += 1;
                    }
                    info!(
                        event_id,
                        message_id = %id,
                        category = %event.category,
                        event_date = %event.event_date,
                        "stored event"
                    );
                }
                Err(StoreError::DuplicateMessageId(_)) => {
                    info!(message_id = %id, "event appeared concurrently, skipping");
                    report.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(report)
    }
}

/// Builds the event for `message`. The flag is true when the receipt time
/// stands in for the event date.
pub fn build_event(message: &RawMessage, ambiguous: AmbiguousDates) -> (NewEvent, bool) {
    let sender = sender::parse_sender(message.from_header.as_deref());
    let extracted = parser::parse_email(&message.subject, &message.body_html);
    let (event_date, used_fallback) = resolve_date(message, extracted.date.as_deref(), ambiguous);

    let event = NewEvent {
        message_id: Some(message.id.clone()),
        sender_name: sender.name,
        sender_address: sender.address,
        subject: message.subject.clone(),
        category: extracted.category.unwrap_or(Category::Other),
        event_date,
        action_link: extracted.link,
        reminded: false,
        created_at: Utc::now(),
    };
    (event, used_fallback)
}

fn resolve_date(
    message: &RawMessage,
    raw_date: Option<&str>,
    ambiguous: AmbiguousDates,
) -> (DateTime<Utc>, bool) {
    let Some(span) = raw_date else {
        debug!(message_id = %message.id, "no date in message, using receipt time");
        return (message.received_at, true);
    };

    match dates::normalize(span, ambiguous) {
        Some(at) => (at, false),
        None => {
            warn!(message_id = %message.id, span, "could not normalize date, using receipt time");
            (message.received_at, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct ScriptedMailbox {
        messages: Arc<Vec<RawMessage>>,
        fetches: Arc<AtomicUsize>,
        broken: Option<String>,
    }

    #[async_trait]
    impl Mailbox for ScriptedMailbox {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<String>, SyncError> {
            Ok(self.messages.iter().map(|m| m.id.clone()).collect())
        }

        async fn fetch(&self, message_id: &str) -> Result<RawMessage, SyncError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.broken.as_deref() == Some(message_id) {
                return Err(SyncError::Transport(anyhow!("connection reset")));
            }
            self.messages
                .iter()
                .find(|m| m.id == message_id)
                .cloned()
                .ok_or_else(|| SyncError::Transport(anyhow!("404 for {message_id}")))
        }
    }

    struct ScriptedProvider {
        mailbox: Option<ScriptedMailbox>,
    }

    #[async_trait]
    impl MailboxProvider for ScriptedProvider {
        type Client = ScriptedMailbox;

        async fn connect(&self) -> Result<ScriptedMailbox, SyncError> {
            self.mailbox
                .clone()
                .ok_or_else(|| SyncError::NotAuthenticated("me".into()))
        }
    }

    fn received() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_729_000_000_456).unwrap()
    }

    fn message(id: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: id.into(),
            subject: subject.into(),
            body_html: body.into(),
            from_header: Some("Acme Careers <careers@acme.io>".into()),
            received_at: received(),
        }
    }

    fn mailbox(messages: Vec<RawMessage>) -> ScriptedMailbox {
        ScriptedMailbox {
            messages: Arc::new(messages),
            ..Default::default()
        }
    }

    fn syncer(db: &Database, mailbox: Option<ScriptedMailbox>) -> Syncer<ScriptedProvider> {
        Syncer::new(
            db.clone(),
            ScriptedProvider { mailbox },
            SyncConfig::default(),
            AmbiguousDates::DayFirst,
        )
    }

    fn stored(message_id: Option<&str>, created_at: DateTime<Utc>) -> NewEvent {
        NewEvent {
            message_id: message_id.map(str::to_string),
            sender_name: "Old".into(),
            sender_address: String::new(),
            subject: "Old".into(),
            category: Category::Other,
            event_date: created_at,
            action_link: None,
            reminded: false,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_builds_event_from_message() {
        let db = Database::in_memory().await.unwrap();
        let inbox = mailbox(vec![message(
            "m1",
            "Interview invitation",
            "<p>Your interview is on 24th Oct 2024.</p><p>Join https://meet.acme.io/r/42</p>",
        )]);

        let report = syncer(&db, Some(inbox)).run_cycle().await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.fallback_dated, 0);

        let event = db.get_event_by_message_id("m1").await.unwrap().unwrap();
        assert_eq!(event.category, Category::Interview);
        assert_eq!(event.event_date, Utc.with_ymd_and_hms(2024, 10, 24, 0, 0, 0).unwrap());
        assert_eq!(event.sender_name, "Acme Careers");
        assert_eq!(event.sender_address, "careers@acme.io");
        assert_eq!(event.subject, "Interview invitation");
        assert_eq!(event.action_link.as_deref(), Some("https://meet.acme.io/r/42"));
        assert!(!event.reminded);
    }

    #[tokio::test]
    async fn test_second_run_adds_nothing() {
        let db = Database::in_memory().await.unwrap();
        let inbox = mailbox(vec![
            message("m1", "Exam schedule", "<p>Exam on 2024-11-02</p>"),
            message("m2", "Registration open", "<p>Apply soon</p>"),
        ]);
        let syncer = syncer(&db, Some(inbox.clone()));

        let first = syncer.run_cycle().await.unwrap();
        assert_eq!(first.inserted, 2);

        let second = syncer.run_cycle().await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(db.count_events().await.unwrap(), 2);
        // Known messages are skipped before they are fetched.
        assert_eq!(inbox.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_date_falls_back_to_receipt_time() {
        let db = Database::in_memory().await.unwrap();
        let inbox = mailbox(vec![
            message("m1", "Interview", "<p>We will call you soon.</p>"),
            message("m2", "Test", "<p>Held on 31/02/2024</p>"),
        ]);

        let report = syncer(&db, Some(inbox)).run_cycle().await.unwrap();
        assert_eq!(report.fallback_dated, 2);

        for id in ["m1", "m2"] {
            let event = db.get_event_by_message_id(id).await.unwrap().unwrap();
            assert_eq!(event.event_date, received());
        }
    }

    #[tokio::test]
    async fn test_retention_and_legacy_purge() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();
        db.insert_event(&stored(Some("old"), now - Duration::days(11))).await.unwrap();
        db.insert_event(&stored(Some("recent"), now - Duration::days(9))).await.unwrap();
        db.insert_event(&stored(None, now)).await.unwrap();

        let report = syncer(&db, Some(mailbox(Vec::new()))).run_cycle().await.unwrap();
        assert_eq!(report.expired_purged, 1);
        assert_eq!(report.legacy_purged, 1);
        assert_eq!(report.candidates, 0);

        assert!(!db.event_exists("old").await.unwrap());
        assert!(db.event_exists("recent").await.unwrap());
        assert_eq!(db.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_not_authenticated_fails_after_purges() {
        let db = Database::in_memory().await.unwrap();
        db.insert_event(&stored(None, Utc::now())).await.unwrap();

        let err = syncer(&db, None).run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::NotAuthenticated(_)));
        assert_eq!(db.count_events().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_earlier_events() {
        let db = Database::in_memory().await.unwrap();
        let mut inbox = mailbox(vec![
            message("m1", "Interview", "<p>24 Oct 2024</p>"),
            message("m2", "Interview", "<p>25 Oct 2024</p>"),
            message("m3", "Interview", "<p>26 Oct 2024</p>"),
        ]);
        inbox.broken = Some("m2".into());

        let err = syncer(&db, Some(inbox)).run_cycle().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(db.event_exists("m1").await.unwrap());
        assert!(!db.event_exists("m3").await.unwrap());
    }

    #[test]
    fn test_unknown_sender_and_screening_category() {
        let mut msg = message("m1", "Screening test", "<p>Online test next week</p>");
        msg.from_header = None;

        let (event, used_fallback) = build_event(&msg, AmbiguousDates::DayFirst);
        assert_eq!(event.sender_name, "Unknown");
        assert_eq!(event.sender_address, "");
        assert_eq!(event.category, Category::Other);
        assert_eq!(event.message_id.as_deref(), Some("m1"));
        assert!(used_fallback);
    }

    #[test]
    fn test_state_allows_one_cycle_at_a_time() {
        let mut state = SyncState::default();
        assert!(state.try_begin());
        assert!(!state.try_begin());

        state.finish(&Ok(SyncReport::default()));
        assert_eq!(state.cycles, 1);
        assert!(state.try_begin());

        state.finish(&Err(SyncError::NotAuthenticated("me".into())));
        assert!(state.last_error.is_some());
        assert!(!state.running);
    }
}
