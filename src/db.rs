use crate::error::StoreError;
use crate::models::{Category, Event, NewEvent};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

const EVENT_COLUMNS: &str = "id, message_id, sender_name, sender_address, subject, category, \
                             event_date, action_link, reminded, created_at";

/// SQLite-backed event store. `message_id` carries a UNIQUE constraint, so a
/// second insert for the same message fails even if two writers race.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database, migrated.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        use sqlx::sqlite::SqlitePoolOptions;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");
        sqlx::query(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn event_exists(&self, message_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM events WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Inserts `event` and returns its id. A message id that is already stored
    /// comes back as [`StoreError::DuplicateMessageId`].
    pub async fn insert_event(&self, event: &NewEvent) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO events (message_id, sender_name, sender_address, subject, category, event_date, action_link, reminded, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.message_id)
        .bind(&event.sender_name)
        .bind(&event.sender_address)
        .bind(&event.subject)
        .bind(event.category.as_str())
        .bind(event.event_date.timestamp_millis())
        .bind(&event.action_link)
        .bind(event.reminded)
        .bind(event.created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StoreError::DuplicateMessageId(event.message_id.clone().unwrap_or_default()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes events created before `cutoff`; returns how many went.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM events WHERE created_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Deletes rows written before message ids were recorded.
    pub async fn delete_without_message_id(&self) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM events WHERE message_id IS NULL OR message_id = ''")
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Events dated after `after`, soonest first.
    pub async fn list_upcoming(&self, after: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE event_date > ? ORDER BY event_date ASC, id ASC"
        ))
        .bind(after.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(event_from_row).collect())
    }

    #[cfg(test)]
    pub async fn get_event_by_message_id(&self, message_id: &str) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE message_id = ?"))
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(event_from_row))
    }

    #[cfg(test)]
    pub async fn count_events(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }
}

fn event_from_row(row: &SqliteRow) -> Event {
    Event {
        id: row.get(0),
        message_id: row.get(1),
        sender_name: row.get(2),
        sender_address: row.get(3),
        subject: row.get(4),
        category: Category::from_name(&row.get::<'_, String, _>(5)),
        event_date: from_millis(row.get(6)),
        action_link: row.get(7),
        reminded: row.get(8),
        created_at: from_millis(row.get(9)),
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
