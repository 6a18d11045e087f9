use crate::config::OAuthConfig;
use crate::error::SyncError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use yup_oauth2::authenticator::Authenticator;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage};
use yup_oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    read_application_secret,
};

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

const APP_NAME: &str = "jobwatch";

pub type GmailAuthenticator = Authenticator<HttpsConnector<HttpConnector>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenData {
    tokens: Vec<TokenInfo>,
}

/// Token storage in the OS keyring, one entry per mailbox identity.
pub struct RingStorage {
    account: String,
}

#[async_trait]
impl TokenStorage for RingStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> Result<()> {
        let entry = self.entry()?;

        let data = TokenData {
            tokens: vec![token],
        };
        let serialized = serde_json::to_string(&data).context("Failed to serialize tokens")?;

        entry
            .set_password(&serialized)
            .map_err(|e| anyhow::anyhow!("Keyring error: {}", e))?;

        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.get_all()
            .await
            .ok()
            .and_then(|data| data.tokens.first().cloned())
    }
}

impl RingStorage {
    pub fn for_identity(identity: &str) -> Self {
        Self {
            account: format!("gmail_token:{identity}"),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(APP_NAME, &self.account).map_err(|e| anyhow::anyhow!("Keyring error: {}", e))
    }

    async fn get_all(&self) -> Result<TokenData> {
        match self.entry()?.get_password() {
            Ok(serialized) => {
                serde_json::from_str(&serialized).context("Failed to deserialize tokens")
            }
            Err(keyring::Error::NoEntry) => Ok(TokenData::default()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }

    pub async fn has_token(&self) -> Result<bool> {
        Ok(!self.get_all().await?.tokens.is_empty())
    }

    pub async fn clear_token(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Keyring error: {}", e)),
        }
    }
}

/// Shows the consent URL to the user. When not interactive it refuses, which
/// makes the OAuth flow fail instead of waiting for a browser that never comes.
struct ConsentDelegate {
    interactive: bool,
}

impl InstalledFlowDelegate for ConsentDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> BoxFuture<'a, std::result::Result<String, String>> {
        Box::pin(async move {
            if !self.interactive {
                return Err("consent required, run with --login".to_string());
            }

            println!("Open this URL to grant read access to your mailbox:\n\n  {url}\n");
            if let Err(e) = open::that(url) {
                warn!(error = %e, "could not launch a browser");
            }

            if !need_code {
                return Ok(String::new());
            }
            println!("Paste the authorization code:");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            match lines.next_line().await {
                Ok(Some(code)) => Ok(code.trim().to_string()),
                Ok(None) => Err("no authorization code entered".to_string()),
                Err(e) => Err(e.to_string()),
            }
        })
    }
}

/// Hands out authenticated Gmail authenticators for one identity.
pub struct CredentialProvider {
    config: OAuthConfig,
    identity: String,
}

impl CredentialProvider {
    pub fn new(config: OAuthConfig, identity: impl Into<String>) -> Self {
        Self {
            config,
            identity: identity.into(),
        }
    }

    pub fn storage(&self) -> RingStorage {
        RingStorage::for_identity(&self.identity)
    }

    async fn application_secret(&self) -> Result<ApplicationSecret> {
        match (&self.config.client_id, &self.config.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(ApplicationSecret {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                auth_uri: self.config.auth_uri.clone(),
                token_uri: self.config.token_uri.clone(),
                redirect_uris: vec![self.config.redirect_uri.clone()],
                ..Default::default()
            }),
            _ => read_application_secret(&self.config.credentials_file)
                .await
                .with_context(|| {
                    format!(
                        "Failed to read application secret from {}",
                        self.config.credentials_file.display()
                    )
                }),
        }
    }

    async fn build(&self, interactive: bool) -> Result<GmailAuthenticator> {
        let secret = self.application_secret().await?;
        let method = if interactive {
            InstalledFlowReturnMethod::HTTPRedirect
        } else {
            InstalledFlowReturnMethod::Interactive
        };

        InstalledFlowAuthenticator::builder(secret, method)
            .with_storage(Box::new(self.storage()))
            .flow_delegate(Box::new(ConsentDelegate { interactive }))
            .build()
            .await
            .context("Failed to build authenticator")
    }

    /// Runs the browser consent flow and stores the resulting token.
    pub async fn login(&self) -> Result<()> {
        let auth = self.build(true).await?;
        auth.token(SCOPES)
            .await
            .context("Authorization was not completed")?;
        info!(identity = %self.identity, "credential stored");
        Ok(())
    }

    /// Authenticator backed by the stored credential, refreshed if expired.
    /// Never prompts the user.
    pub async fn authenticator(&self) -> Result<GmailAuthenticator, SyncError> {
        match self.storage().has_token().await {
            Ok(true) => {}
            Ok(false) => return Err(SyncError::NotAuthenticated(self.identity.clone())),
            Err(e) => {
                warn!(error = %e, "could not read the stored credential");
                return Err(SyncError::NotAuthenticated(self.identity.clone()));
            }
        }

        let auth = self.build(false).await.map_err(|e| {
            warn!(error = %e, "could not set up the OAuth client");
            SyncError::NotAuthenticated(self.identity.clone())
        })?;

        auth.token(SCOPES)
            .await
            .map_err(|e| SyncError::RefreshDenied(e.to_string()))?;

        Ok(auth)
    }
}
