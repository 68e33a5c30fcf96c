//! Filesystem watch on the clips folder.
//!
//! notify calls back on its own thread; the callback only filters and
//! forwards a `FolderChanged` event into the core loop, which does the
//! actual rescan.

use std::path::{Path, PathBuf};

use clip_proto::clips::is_video_file;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::core::DaemonEvent;
use crate::error::ServiceError;

/// Live watch.  Dropping it stops the notifications.
pub struct FolderWatcher {
    _watcher: RecommendedWatcher,
    folder: PathBuf,
}

impl FolderWatcher {
    /// Watch `folder` (non-recursive).  Every event is tagged with
    /// `generation` so the core can drop ones from a replaced watch.
    pub fn start(
        folder: &Path,
        generation: u64,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> Result<Self, ServiceError> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("folder watch error: {}", e);
                    return;
                }
            };
            if !is_membership_change(&event) {
                return;
            }
            debug!("folder change: {:?} {:?}", event.kind, event.paths);
            match event_tx.try_send(DaemonEvent::FolderChanged { generation }) {
                Ok(()) => {}
                // A queued FolderChanged already guarantees a rescan.
                Err(TrySendError::Full(_)) => debug!("event queue full, change coalesced"),
                Err(TrySendError::Closed(_)) => {}
            }
        })
        .map_err(|source| ServiceError::Watch {
            path: folder.to_path_buf(),
            source,
        })?;

        watcher
            .watch(folder, RecursiveMode::NonRecursive)
            .map_err(|source| ServiceError::Watch {
                path: folder.to_path_buf(),
                source,
            })?;

        info!("watching {:?} (generation {})", folder, generation);
        Ok(Self {
            _watcher: watcher,
            folder: folder.to_path_buf(),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

/// Dot-files other than ones the scan would list as clips.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| name.starts_with('.') && !is_video_file(&name))
}

/// True for entries appearing or disappearing, including renames.  Content
/// edits and events that only touch hidden non-clip files are ignored.
pub fn is_membership_change(event: &Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant_kind && event.paths.iter().any(|p| !is_hidden(p))
}
