//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use drivesync_common::{Error, Result};
use drivesync_storage::gdrive::{GDriveConfig, DRIVE_SCOPE};

/// Directory watched when no configuration file overrides it.
pub const DEFAULT_ROOT_DIR: &str = "sync/";
/// Drive folder receiving every upload.
pub const DEFAULT_FOLDER_ID: &str = "1PyIBynk6dk5200DnWXV3C_t9xjVciTkD";
pub const DEFAULT_TOKEN_PATH: &str = "token.json";
pub const DEFAULT_CLIENT_SECRETS_PATH: &str = "credentials.json";
/// Entries shown by a plain file listing.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 10;

/// Configuration for a sync run.
///
/// Every field has a compiled-in default; a JSON file may override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory to watch recursively.
    pub root_dir: PathBuf,
    /// Destination folder ID in Google Drive.
    pub folder_id: String,
    /// Persisted credential file.
    pub token_path: PathBuf,
    /// OAuth2 client registration file.
    pub client_secrets_path: PathBuf,
    /// OAuth2 scopes requested during authorization.
    pub scopes: Vec<String>,
    /// Default number of files shown by `list`.
    pub list_page_size: usize,
    /// Whether authorization opens a browser automatically.
    pub open_browser: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            folder_id: DEFAULT_FOLDER_ID.to_string(),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            client_secrets_path: PathBuf::from(DEFAULT_CLIENT_SECRETS_PATH),
            scopes: vec![DRIVE_SCOPE.to_string()],
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            open_browser: true,
        }
    }
}

impl SyncConfig {
    /// Load overrides from a JSON file.
    ///
    /// # Errors
    /// - `Error::Config` if the file cannot be read or parsed
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;

        Self::from_json(&data)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Parse overrides from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.folder_id.trim().is_empty() {
            return Err(Error::InvalidInput("folder_id cannot be empty".to_string()));
        }
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::InvalidInput("root_dir cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Google Drive connection settings derived from this configuration.
    pub fn gdrive(&self) -> GDriveConfig {
        GDriveConfig {
            folder_id: self.folder_id.clone(),
            token_path: self.token_path.clone(),
            client_secrets_path: self.client_secrets_path.clone(),
            scopes: self.scopes.clone(),
            open_browser: self.open_browser,
        }
    }
}
