//! Credential persistence, acquisition and refresh.
//!
//! The [`CredentialStore`] is the single place that decides whether a
//! persisted credential can be used as-is, must be refreshed, or has to be
//! replaced through the interactive authorization flow. Every credential it
//! hands out has already been written back to the [`TokenStore`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use drivesync_common::{Error, Result};

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this window are treated as expired.
const EXPIRY_SKEW_MINUTES: i64 = 5;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth2 credential in Google's "authorized user" JSON layout.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for API requests.
    #[serde(rename = "token", default)]
    pub access_token: String,
    /// Token used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Endpoint used for refreshing.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// When the access token expires. `None` means it never does.
    #[serde(rename = "expiry", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now() + Duration::minutes(EXPIRY_SKEW_MINUTES),
            None => false,
        }
    }

    /// Check if the access token can be used without refreshing.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Check if a refresh token is available.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Valid now, or refreshable into a valid credential.
    pub fn is_usable(&self) -> bool {
        self.is_valid() || self.can_refresh()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Durable storage for a single credential.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the persisted credential, if any.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Persist a credential, replacing the previous one.
    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// Source of new credentials.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Exchange the credential's refresh token for a new access token.
    ///
    /// # Errors
    /// - `Error::Authentication` if the identity provider rejects the refresh
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;

    /// Obtain a brand new credential with user consent.
    ///
    /// # Errors
    /// - `Error::Authentication` if the flow cannot complete
    async fn authorize(&self) -> Result<Credential>;
}

/// Credential persisted as a JSON file.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };

        let credential = serde_json::from_str(&data).map_err(|e| {
            Error::Serialization(format!(
                "Invalid credential file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| Error::Serialization(format!("Failed to serialize credential: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!(path = %self.path.display(), "Credential persisted");
        Ok(())
    }
}

/// Acquires, refreshes and persists the process credential.
pub struct CredentialStore {
    store: Arc<dyn TokenStore>,
    flow: Arc<dyn AuthFlow>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn TokenStore>, flow: Arc<dyn AuthFlow>) -> Self {
        Self { store, flow }
    }

    /// Produce a valid credential.
    ///
    /// A persisted valid credential is returned without any network call or
    /// write. Otherwise the credential is refreshed when it carries a refresh
    /// token, or obtained through the interactive flow, and persisted once.
    ///
    /// # Errors
    /// - `Error::Authentication` if refresh is rejected or the flow fails
    /// - I/O errors while persisting
    pub async fn acquire(&self) -> Result<Credential> {
        let persisted = match self.store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Ignoring unreadable credential: {}", e);
                None
            }
        };

        let credential = match persisted {
            Some(credential) if credential.is_valid() => {
                debug!("Using persisted credential");
                return Ok(credential);
            }
            Some(credential) if credential.can_refresh() => {
                info!("Refreshing expired credential");
                self.flow.refresh(&credential).await?
            }
            _ => {
                info!("No usable credential, starting authorization flow");
                self.flow.authorize().await?
            }
        };

        self.store.save(&credential).await?;
        Ok(credential)
    }

    /// Refresh a credential and persist the result.
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        if !credential.can_refresh() {
            return Err(Error::Authentication(
                "Access token expired and no refresh token is available".to_string(),
            ));
        }

        let refreshed = self.flow.refresh(credential).await?;
        self.store.save(&refreshed).await?;
        Ok(refreshed)
    }
}

/// Authenticated session handle that refreshes expired tokens on demand.
pub struct TokenManager {
    credentials: CredentialStore,
    current: RwLock<Credential>,
}

impl TokenManager {
    /// Create a token manager with an already acquired credential.
    pub fn new(credentials: CredentialStore, credential: Credential) -> Self {
        Self {
            credentials,
            current: RwLock::new(credential),
        }
    }

    /// Acquire a credential and wrap it in a token manager.
    pub async fn start(credentials: CredentialStore) -> Result<Self> {
        let credential = credentials.acquire().await?;
        Ok(Self::new(credentials, credential))
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// # Errors
    /// - Token refresh failed
    pub async fn access_token(&self) -> Result<String> {
        let current = self.current.read().await;

        if current.is_valid() {
            return Ok(current.access_token.clone());
        }

        drop(current);

        let mut current = self.current.write().await;

        // Double-check after acquiring write lock
        if current.is_valid() {
            return Ok(current.access_token.clone());
        }

        info!("Refreshing expired access token");
        let refreshed = self.credentials.refresh(&current).await?;
        *current = refreshed;

        Ok(current.access_token.clone())
    }

    /// Get the current credential.
    pub async fn credential(&self) -> Credential {
        self.current.read().await.clone()
    }
}
