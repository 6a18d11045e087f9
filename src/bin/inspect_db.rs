use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <search_query> [database_url]", args[0]);
        eprintln!("Search query matches against sender or subject of stored events.");
        std::process::exit(1);
    }

    let query = &args[1];
    let search_term = format!("%{}%", query);

    let database_url = args.get(2).map(String::as_str).unwrap_or("sqlite://jobwatch.db");
    let pool = SqlitePoolOptions::new()
        .connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let rows = sqlx::query(
        "SELECT id, message_id, sender_name, sender_address, subject, category, event_date, action_link, reminded, created_at
         FROM events
         WHERE sender_name LIKE ? OR sender_address LIKE ? OR subject LIKE ?
         ORDER BY created_at DESC",
    )
    .bind(&search_term)
    .bind(&search_term)
    .bind(&search_term)
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        println!("No events found matching '{}'", query);
        return Ok(());
    }

    for row in rows {
        let id: i64 = row.get("id");
        let message_id: Option<String> = row.get("message_id");
        let sender_name: String = row.get("sender_name");
        let sender_address: String = row.get("sender_address");
        let subject: String = row.get("subject");
        let category: String = row.get("category");
        let event_date: i64 = row.get("event_date");
        let action_link: Option<String> = row.get("action_link");
        let reminded: bool = row.get("reminded");
        let created_at: i64 = row.get("created_at");

        println!("Event #{}", id);
        println!("Message ID: {:?}", message_id);
        println!("From: {} <{}>", sender_name, sender_address);
        println!("Subject: {}", subject);
        println!("Category: {}", category);
        println!("Event Date: {}", format_millis(event_date));
        println!("Link: {}", action_link.as_deref().unwrap_or("(None)"));
        println!("Reminded: {}", reminded);
        println!("Created: {}", format_millis(created_at));
        println!(
            "--------------------------------------------------------------------------------"
        );
    }

    Ok(())
}
