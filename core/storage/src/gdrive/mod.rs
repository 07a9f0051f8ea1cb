//! Google Drive storage backend for drivesync.
//!
//! This module provides:
//! - OAuth2 installed-app authorization with a loopback redirect listener
//! - A Drive v3 client implementing `StorageBackend`
//! - Resumable uploads for large files
//! - A one-call connector producing a ready gateway

pub mod auth;
pub mod client;
pub mod provider;

pub use auth::{ClientConfig, InstalledAppFlow, DRIVE_SCOPE};
pub use client::DriveClient;
pub use provider::{connect_gdrive, GDriveConfig};
