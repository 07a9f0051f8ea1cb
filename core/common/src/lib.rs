//! Common utilities and types shared across drivesync modules.
//!
//! This module provides the error taxonomy and the small records passed
//! between the watcher, the storage gateway and the sync coordinator.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ChangeEvent, ChangeKind, RemoteFileRef};
