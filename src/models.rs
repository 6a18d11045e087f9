use chrono::{DateTime, Utc};
use std::fmt;

/// Kind of job-related event a message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    Interview,
    Exam,
    Registration,
    #[default]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Interview => "Interview",
            Category::Exam => "Exam",
            Category::Registration => "Registration",
            Category::Other => "Other",
        }
    }

    /// Unknown names read back as `Other`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Interview" => Category::Interview,
            "Exam" => Category::Exam,
            "Registration" => Category::Registration,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A message as handed over by the mailbox client.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub subject: String,
    pub body_html: String,
    pub from_header: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// What the email parser found in one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub category: Option<Category>,
    pub date: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub name: String,
    pub address: String,
}

/// A stored event. `message_id` is only ever missing on legacy rows.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub message_id: Option<String>,
    pub sender_name: String,
    pub sender_address: String,
    pub subject: String,
    pub category: Category,
    pub event_date: DateTime<Utc>,
    pub action_link: Option<String>,
    pub reminded: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert-side event record.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub message_id: Option<String>,
    pub sender_name: String,
    pub sender_address: String,
    pub subject: String,
    pub category: Category,
    pub event_date: DateTime<Utc>,
    pub action_link: Option<String>,
    pub reminded: bool,
    pub created_at: DateTime<Utc>,
}
