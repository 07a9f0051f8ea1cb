//! File system watching for drivesync.
//!
//! Wraps the platform's recommended `notify` backend and reports file
//! creations and modifications under a root directory through a callback.
//! Delivery is best effort: coalescing depends on the OS facility and no
//! internal queue is kept.

pub mod events;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use drivesync_common::{ChangeEvent, Error, Result};

pub use events::translate;

/// Recursive watcher over a single root directory.
///
/// Dropping the watcher stops it.
pub struct ChangeWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    /// Start watching `root` recursively.
    ///
    /// `on_event` runs on the watcher's own thread, once per changed path per
    /// notification. Failures of the notification backend are delivered as
    /// `Err(Error::Watch)`.
    ///
    /// # Errors
    /// - `Error::Watch` if the root cannot be watched (missing, no permission)
    pub fn watch<F>(root: impl Into<PathBuf>, mut on_event: F) -> Result<Self>
    where
        F: FnMut(Result<ChangeEvent>) + Send + 'static,
    {
        let root = root.into();

        let mut watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for change in translate(event) {
                        on_event(Ok(change));
                    }
                }
                Err(e) => on_event(Err(Error::Watch(e.to_string()))),
            },
        )
        .map_err(|e| Error::Watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(format!("Failed to watch {}: {}", root.display(), e)))?;

        info!(root = %root.display(), "Watching for changes");

        Ok(Self {
            root,
            watcher: Some(watcher),
        })
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the watcher still holds its OS handles.
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching and release OS handles.
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                // The root may already be gone; dropping the watcher still frees it.
                debug!("Unwatch failed: {}", e);
            }
            info!(root = %self.root.display(), "Stopped watching");
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
