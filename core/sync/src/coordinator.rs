//! Main control loop: watcher events in, uploads out.

use std::future::Future;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use drivesync_common::{ChangeEvent, Error, Result};
use drivesync_storage::{RemoteFileGateway, StorageBackend, UploadOutcome};
use drivesync_watcher::ChangeWatcher;

/// Lifecycle of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Watching,
    Stopping,
    Terminated,
}

/// Why the watch loop ended.
#[derive(Debug)]
pub enum Termination {
    /// The shutdown signal fired.
    Interrupted,
    /// The notification backend reported a failure.
    WatcherFault(Error),
    /// The watcher stopped delivering events.
    WatcherClosed,
    /// Waiting for the shutdown signal itself failed.
    SignalFailed(Error),
}

/// What happened to a single change event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Nothing to upload (watched root, directory, or nameless path).
    Ignored,
    Uploaded(UploadOutcome),
    /// The upload failed; the loop carries on.
    Failed(Error),
}

/// Messages produced by the watcher callback.
pub type WatchMessage = Result<ChangeEvent>;

/// Wires change events to gateway uploads.
///
/// Events are handled one at a time; a slow upload delays the next event.
pub struct SyncCoordinator<B: StorageBackend + ?Sized> {
    root: PathBuf,
    gateway: RemoteFileGateway<B>,
    state: watch::Sender<CoordinatorState>,
}

impl<B: StorageBackend + ?Sized> SyncCoordinator<B> {
    /// Create a coordinator for `root` uploading through `gateway`.
    pub fn new(root: impl Into<PathBuf>, gateway: RemoteFileGateway<B>) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Self {
            root: root.into(),
            gateway,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    fn transition(&self, next: CoordinatorState) {
        let previous = self.state.send_replace(next);
        debug!(?previous, ?next, "Coordinator state change");
    }

    /// Upload the file behind a change event.
    ///
    /// Failures are logged and returned, never propagated.
    pub async fn handle_event(&self, event: &ChangeEvent) -> EventOutcome {
        info!("Received {} event - {}", event.kind, event.path.display());

        if event.is_root(&self.root) {
            debug!("Ignoring event for the watched root");
            return EventOutcome::Ignored;
        }

        let Some(remote_name) = event.file_name() else {
            debug!(path = %event.path.display(), "Ignoring path without a file name");
            return EventOutcome::Ignored;
        };

        if tokio::fs::metadata(&event.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            debug!(path = %event.path.display(), "Ignoring directory");
            return EventOutcome::Ignored;
        }

        match self.gateway.upload(&event.path, remote_name).await {
            Ok(outcome) => EventOutcome::Uploaded(outcome),
            Err(e) => {
                match &e {
                    Error::Upload { .. } => warn!("Skipping {}: {}", event.path.display(), e),
                    _ => error!("Upload of {} failed: {}", event.path.display(), e),
                }
                EventOutcome::Failed(e)
            }
        }
    }

    /// Process watcher messages until shutdown, a watcher fault, or the end
    /// of the stream.
    ///
    /// The shutdown future is only polled between events, so an in-flight
    /// upload always finishes first. Leaves the coordinator in `Stopping`.
    pub async fn drive<S>(
        &mut self,
        mut events: mpsc::UnboundedReceiver<WatchMessage>,
        shutdown: S,
    ) -> Termination
    where
        S: Future<Output = Result<()>>,
    {
        self.transition(CoordinatorState::Watching);
        tokio::pin!(shutdown);

        let termination = loop {
            tokio::select! {
                biased;

                signal = &mut shutdown => {
                    break match signal {
                        Ok(()) => Termination::Interrupted,
                        Err(e) => Termination::SignalFailed(e),
                    };
                }
                message = events.recv() => match message {
                    Some(Ok(event)) => {
                        self.handle_event(&event).await;
                    }
                    Some(Err(e)) => break Termination::WatcherFault(e),
                    None => break Termination::WatcherClosed,
                },
            }
        };

        match &termination {
            Termination::Interrupted => info!("Shutdown requested"),
            Termination::WatcherClosed => warn!("Watcher stopped delivering events"),
            Termination::WatcherFault(e) => error!("Watcher failed: {}", e),
            Termination::SignalFailed(e) => error!("Waiting for shutdown signal failed: {}", e),
        }

        self.transition(CoordinatorState::Stopping);
        termination
    }

    /// Watch the root directory and upload changes until `shutdown` fires.
    ///
    /// # Errors
    /// - `Error::Watch` if watching cannot start; every later failure ends
    ///   the loop gracefully and is reported through `Termination`
    pub async fn run<S>(&mut self, shutdown: S) -> Result<Termination>
    where
        S: Future<Output = Result<()>>,
    {
        let (mut watcher, events) = match self.start_watcher().await {
            Ok(started) => started,
            Err(e) => {
                self.transition(CoordinatorState::Terminated);
                return Err(e);
            }
        };

        let termination = self.drive(events, shutdown).await;

        watcher.stop();
        self.transition(CoordinatorState::Terminated);
        Ok(termination)
    }

    async fn start_watcher(
        &mut self,
    ) -> Result<(ChangeWatcher, mpsc::UnboundedReceiver<WatchMessage>)> {
        // Backends report absolute paths; compare against the same form.
        self.root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| Error::Watch(format!("Cannot resolve {}: {}", self.root.display(), e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = ChangeWatcher::watch(&self.root, move |message| {
            // Receiver gone means the loop already ended.
            let _ = tx.send(message);
        })?;

        Ok((watcher, rx))
    }
}
