mod auth;
mod classifier;
mod config;
mod dates;
mod db;
mod error;
mod gmail;
mod links;
mod mailbox;
mod models;
mod parser;
mod parts;
mod scheduler;
mod sender;
mod sync;

use crate::config::Config;
use crate::scheduler::{Scheduler, Trigger};
use chrono::{Local, Utc};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn init_logging(debug_logging: bool) {
    let default_directive = if debug_logging {
        "jobwatch=debug"
    } else {
        "jobwatch=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(has_flag("--debug"));
    let config = Config::load();
    let credentials = auth::CredentialProvider::new(config.oauth.clone(), config.identity.clone());

    // Handle token reset
    if has_flag("--reset-token") {
        credentials.storage().clear_token().await?;
        println!("Token cleared. Run with --login to authorize again.");
        return Ok(());
    }

    if has_flag("--login") {
        credentials.login().await?;
        println!("Signed in as {}.", config.identity);
        return Ok(());
    }

    let db = db::Database::new(&config.database_url).await?;
    db.run_migrations().await?;

    if has_flag("--upcoming") {
        let events = db.list_upcoming(Utc::now()).await?;
        if events.is_empty() {
            println!("No upcoming events.");
        }
        for event in events {
            println!(
                "#{:<5} {}{}  {:<12}  {}  ({} <{}>)  {}",
                event.id,
                event.event_date.with_timezone(&Local).format("%a %d %b %Y %H:%M"),
                if event.reminded { " *" } else { "" },
                event.category,
                event.subject,
                event.sender_name,
                event.sender_address,
                event.action_link.as_deref().unwrap_or("-"),
            );
        }
        return Ok(());
    }

    let provider = gmail::GmailProvider::new(credentials, &config.sync);
    let syncer = sync::Syncer::new(db, provider, config.sync.clone(), config.dates.ambiguous);
    let scheduler = Arc::new(Scheduler::new(syncer));

    if has_flag("--once") {
        return match scheduler.trigger(Trigger::Manual).await {
            Some(Ok(report)) => {
                println!(
                    "Stored {} new event(s), {} already known, {} candidate message(s).",
                    report.inserted, report.skipped, report.candidates
                );
                Ok(())
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(()),
        };
    }

    scheduler.run(config.sync.interval()).await
}
