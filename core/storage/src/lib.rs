//! Storage side of drivesync.
//!
//! This module provides the credential lifecycle, a trait-based interface
//! for the remote storage backend (Google Drive or in-memory) and the
//! gateway that uploads local files into the fixed target folder.
//!
//! # Design Principles
//! - Backend isolation: the gateway only sees `StorageBackend`
//! - Explicit authentication: credentials are acquired once, before any upload
//! - No caching: every upload looks the file up by name again

pub mod credentials;
pub mod gateway;
pub mod gdrive;
pub mod memory;
pub mod provider;

pub use credentials::{AuthFlow, Credential, CredentialStore, FileTokenStore, TokenManager, TokenStore};
pub use gateway::{RemoteFileGateway, UploadOutcome};
pub use memory::{BackendCall, MemoryBackend};
pub use provider::{FileQuery, StorageBackend};
