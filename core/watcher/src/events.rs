//! Translation of `notify` events into change events.

use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use std::path::PathBuf;

use drivesync_common::{ChangeEvent, ChangeKind};

/// Convert a notify event into zero or more change events.
///
/// Creations of any kind map to `Created`; content, metadata and unspecified
/// modifications map to `Modified`. The destination of a rename is a new file
/// under its name, so it maps to `Created`; the source side is dropped.
/// Removals and access events are dropped.
pub fn translate(event: notify::Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(mode)) => {
            return renamed_to(mode, event.paths)
                .map(ChangeEvent::created)
                .into_iter()
                .collect();
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| ChangeEvent { path, kind })
        .collect()
}

/// Destination path of a rename notification, if it carries one.
///
/// `Both` lists the source first and the destination last. `Any` comes from
/// backends that cannot tell the two sides apart; the coordinator skips the
/// path if it no longer exists.
fn renamed_to(mode: RenameMode, mut paths: Vec<PathBuf>) -> Option<PathBuf> {
    match mode {
        RenameMode::To | RenameMode::Both | RenameMode::Any => paths.pop(),
        RenameMode::From | RenameMode::Other => None,
    }
}
