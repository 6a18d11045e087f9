use crate::dates::AmbiguousDates;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// Whose mailbox is scanned; the credential is stored under this key.
    pub identity: String,
    pub oauth: OAuthConfig,
    pub sync: SyncConfig,
    pub dates: DateConfig,
}

/// OAuth client settings handed to the credential provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_uri: String,
    pub token_uri: String,
    /// Google client secret JSON, used when `client_id` is not set.
    pub credentials_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retention_days: i64,
    pub interval_secs: u64,
    pub call_timeout_secs: u64,
    pub cycle_timeout_secs: u64,
    pub page_size: u32,
    /// Subject keywords the mailbox search asks for.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DateConfig {
    pub ambiguous: AmbiguousDates,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:jobwatch.db?mode=rwc".to_string(),
            identity: "me".to_string(),
            oauth: OAuthConfig::default(),
            sync: SyncConfig::default(),
            dates: DateConfig::default(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            credentials_file: PathBuf::from("credentials.json"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_days: 10,
            interval_secs: 4 * 60 * 60,
            call_timeout_secs: 30,
            cycle_timeout_secs: 10 * 60,
            page_size: 100,
            keywords: ["interview", "exam", "test", "registration", "screening"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl SyncConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Self {
        use std::fs;
        match fs::read_to_string(SETTINGS_FILE) {
            Ok(content) => Self::from_toml(&content),
            Err(_) => Self::default(),
        }
    }

    fn from_toml(content: &str) -> Self {
        match toml::from_str(content) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "ignoring invalid {SETTINGS_FILE}, using defaults");
                Self::default()
            }
        }
    }
}
