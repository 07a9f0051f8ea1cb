//! Wiring of credentials, Drive client and gateway.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use drivesync_common::Result;

use crate::credentials::{CredentialStore, FileTokenStore, TokenManager};
use crate::gateway::RemoteFileGateway;

use super::auth::{InstalledAppFlow, DRIVE_SCOPE};
use super::client::DriveClient;

/// Google Drive connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GDriveConfig {
    /// Destination folder ID in Google Drive.
    pub folder_id: String,
    /// Where the credential is persisted.
    pub token_path: PathBuf,
    /// Client registration used by the interactive flow.
    pub client_secrets_path: PathBuf,
    /// OAuth2 scopes to request.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Whether the interactive flow launches a browser.
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_scopes() -> Vec<String> {
    vec![DRIVE_SCOPE.to_string()]
}

fn default_open_browser() -> bool {
    true
}

/// Acquire a credential and build a gateway for the configured folder.
///
/// # Errors
/// - `Error::Authentication` if no valid credential can be obtained
pub async fn connect_gdrive(config: &GDriveConfig) -> Result<RemoteFileGateway<DriveClient>> {
    let store = Arc::new(FileTokenStore::new(&config.token_path));
    let flow = Arc::new(
        InstalledAppFlow::new(&config.client_secrets_path, config.scopes.clone())?
            .with_browser(config.open_browser),
    );

    let token_manager = Arc::new(TokenManager::start(CredentialStore::new(store, flow)).await?);
    let client = DriveClient::new(token_manager)?;

    info!(folder = %config.folder_id, "Connected to Google Drive");
    Ok(RemoteFileGateway::new(Arc::new(client), config.folder_id.clone()))
}
