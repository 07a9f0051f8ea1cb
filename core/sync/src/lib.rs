//! drivesync sync coordination
//!
//! Connects the change watcher to the remote file gateway:
//! - Runtime configuration with compiled-in defaults
//! - The coordinator loop, which uploads each created or modified file
//!   into the target folder, one event at a time
//!
//! Per-event failures are logged and skipped. Watcher failures and the
//! shutdown signal end the loop gracefully.

pub mod config;
pub mod coordinator;

pub use config::SyncConfig;
pub use coordinator::{CoordinatorState, EventOutcome, SyncCoordinator, Termination, WatchMessage};
