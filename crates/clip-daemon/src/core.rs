/// DaemonCore: single-owner event loop for the watched folder and clip list.
///
/// HTTP handlers and the folder watcher never touch state directly; they
/// send a `DaemonEvent` and, where they need an answer, wait on a oneshot.
/// Each event runs to completion (validate, rescan, broadcast) before the
/// next one is taken, so pushes reach displays in scan order.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clip_proto::clips::scan_folder;
use clip_proto::protocol::{Clip, FolderConfig};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;
use crate::state::ClipStore;
use crate::watcher::FolderWatcher;
use crate::BroadcastMessage;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// New folder from the API.  `reported` is the size of the list the
    /// folder source sent along, if any.
    SetFolder {
        path: String,
        reported: Option<usize>,
        reply: oneshot::Sender<Result<FolderConfig, ServiceError>>,
    },
    /// Forced rescan; replies with the fresh list.
    Refresh {
        reply: oneshot::Sender<Arc<Vec<Clip>>>,
    },
    /// Something was added to or removed from the watched folder.
    FolderChanged { generation: u64 },
    Shutdown,
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    store: Arc<ClipStore>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Handed to each new watcher so its callback can reach this loop.
    event_tx: mpsc::Sender<DaemonEvent>,
    watcher: Option<FolderWatcher>,
    /// Generation of the live watcher; events from older ones are dropped.
    generation: u64,
}

impl DaemonCore {
    pub fn new(
        folder_file: PathBuf,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            store: Arc::new(ClipStore::new(folder_file)),
            broadcast_tx,
            event_tx,
            watcher: None,
            generation: 0,
        }
    }

    pub fn store(&self) -> Arc<ClipStore> {
        Arc::clone(&self.store)
    }

    /// Resume watching the persisted folder, if there is one.  A folder
    /// that has since disappeared is logged and left unwatched.
    pub async fn start(&mut self) {
        let Some(folder) = self.store.folder().await else {
            info!("DaemonCore: no folder configured yet");
            return;
        };
        if !folder.is_dir() {
            warn!("DaemonCore: persisted folder {:?} is gone", folder);
            return;
        }
        let generation = self.generation + 1;
        match FolderWatcher::start(&folder, generation, self.event_tx.clone()) {
            Ok(watcher) => {
                self.watcher = Some(watcher);
                self.generation = generation;
            }
            Err(e) => error!("DaemonCore: {}", e),
        }
        self.rescan().await;
    }

    /// Validate, watch, persist, then swap in the new folder and rescan.
    /// Any failure leaves the previous folder, watch and list in place.
    pub async fn set_folder(
        &mut self,
        raw: &str,
        reported: Option<usize>,
    ) -> Result<FolderConfig, ServiceError> {
        let folder = validate_folder(raw)?;
        if let Some(count) = reported {
            debug!("DaemonCore: folder source listed {} clips", count);
        }

        let generation = self.generation + 1;
        let watcher = FolderWatcher::start(&folder, generation, self.event_tx.clone())?;
        self.store.set_folder(folder.clone()).await?;

        if let Some(old) = self.watcher.replace(watcher) {
            debug!("DaemonCore: stopped watching {:?}", old.folder());
        }
        self.generation = generation;
        info!("DaemonCore: clips folder set to {:?}", folder);

        self.rescan().await;
        Ok(FolderConfig {
            clips_folder: Some(folder),
        })
    }

    /// Scan the current folder, store the list and push it to displays.
    /// A failed scan counts as an empty folder.
    pub async fn rescan(&mut self) -> Arc<Vec<Clip>> {
        let clips = match self.store.folder().await {
            Some(folder) => scan_or_empty(folder).await,
            None => Vec::new(),
        };
        info!("DaemonCore: {} clips", clips.len());
        let clips = self.store.replace_clips(clips).await;
        // No receivers is fine.
        let _ = self
            .broadcast_tx
            .send(BroadcastMessage::ClipsUpdated(Arc::clone(&clips)));
        clips
    }

    /// Returns false once the loop should stop.
    pub async fn handle_event(&mut self, evt: DaemonEvent) -> bool {
        match evt {
            DaemonEvent::SetFolder {
                path,
                reported,
                reply,
            } => {
                let result = self.set_folder(&path, reported).await;
                if let Err(e) = &result {
                    warn!("DaemonCore: set folder {:?} failed: {}", path, e);
                }
                let _ = reply.send(result);
            }
            DaemonEvent::Refresh { reply } => {
                let clips = self.rescan().await;
                let _ = reply.send(clips);
            }
            DaemonEvent::FolderChanged { generation } => {
                if generation != self.generation {
                    debug!(
                        "DaemonCore: dropping change from old watch (gen {} != {})",
                        generation, self.generation
                    );
                } else {
                    self.rescan().await;
                }
            }
            DaemonEvent::Shutdown => {
                info!("DaemonCore: shutdown requested");
                return false;
            }
        }
        true
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        info!("DaemonCore: starting event loop");
        loop {
            let Some(evt) = event_rx.recv().await else {
                info!("DaemonCore: event channel closed, shutting down");
                break;
            };
            if !self.handle_event(evt).await {
                break;
            }
        }
        self.watcher = None;
        Ok(())
    }
}

/// Trimmed, canonical, existing directory.
fn validate_folder(raw: &str) -> Result<PathBuf, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidFolder(
            "clipsFolder is required".to_string(),
        ));
    }
    match Path::new(trimmed).canonicalize() {
        Ok(path) if path.is_dir() => Ok(path),
        Ok(_) => Err(ServiceError::InvalidFolder(format!(
            "not a directory: {}",
            trimmed
        ))),
        Err(_) => Err(ServiceError::InvalidFolder(format!(
            "folder does not exist: {}",
            trimmed
        ))),
    }
}

async fn scan_or_empty(folder: PathBuf) -> Vec<Clip> {
    let result = tokio::task::spawn_blocking(move || {
        let clips = scan_folder(&folder);
        (folder, clips)
    })
    .await;
    match result {
        Ok((_, Ok(clips))) => clips,
        Ok((folder, Err(e))) => {
            warn!("DaemonCore: scan of {:?} failed: {}", folder, e);
            Vec::new()
        }
        Err(e) => {
            error!("DaemonCore: scan task failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    struct Harness {
        core: DaemonCore,
        updates: broadcast::Receiver<BroadcastMessage>,
        _events: mpsc::Receiver<DaemonEvent>,
        _data: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let data = tempfile::tempdir().unwrap();
        let (broadcast_tx, updates) = broadcast::channel(16);
        let (event_tx, events) = mpsc::channel(16);
        let core = DaemonCore::new(data.path().join("folder.json"), broadcast_tx, event_tx);
        Harness {
            core,
            updates,
            _events: events,
            _data: data,
        }
    }

    fn touch(dir: &Path, name: &str, secs: u64) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn names(clips: &[Clip]) -> Vec<&str> {
        clips.iter().map(|c| c.name.as_str()).collect()
    }

    fn pushed(rx: &mut broadcast::Receiver<BroadcastMessage>) -> Vec<Arc<Vec<Clip>>> {
        let mut out = Vec::new();
        while let Ok(BroadcastMessage::ClipsUpdated(clips)) = rx.try_recv() {
            out.push(clips);
        }
        out
    }

    #[tokio::test]
    async fn test_set_folder_scans_and_pushes() {
        let mut h = harness();
        let clips_dir = tempfile::tempdir().unwrap();
        touch(clips_dir.path(), "a.mp4", 100);
        touch(clips_dir.path(), "b.txt", 150);
        touch(clips_dir.path(), "c.mkv", 200);

        let config = h
            .core
            .set_folder(clips_dir.path().to_str().unwrap(), Some(2))
            .await
            .unwrap();

        let canonical = clips_dir.path().canonicalize().unwrap();
        assert_eq!(config.clips_folder, Some(canonical.clone()));
        assert_eq!(h.core.store().folder().await, Some(canonical));

        let pushes = pushed(&mut h.updates);
        assert_eq!(pushes.len(), 1);
        assert_eq!(names(&pushes[0]), ["c.mkv", "a.mp4"]);
    }

    #[tokio::test]
    async fn test_invalid_folder_leaves_state_unchanged() {
        let mut h = harness();
        let clips_dir = tempfile::tempdir().unwrap();
        touch(clips_dir.path(), "keep.mp4", 10);
        h.core
            .set_folder(clips_dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        let generation = h.core.generation;
        pushed(&mut h.updates);

        for bad in ["", "   ", "/definitely/not/here/clips"] {
            let err = h.core.set_folder(bad, None).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidFolder(_)), "{bad:?}");
        }
        let file = clips_dir.path().join("keep.mp4");
        let err = h
            .core
            .set_folder(file.to_str().unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidFolder(_)));

        assert_eq!(h.core.generation, generation);
        assert!(h.core.watcher.is_some());
        assert_eq!(
            h.core.store().folder().await,
            Some(clips_dir.path().canonicalize().unwrap())
        );
        assert_eq!(names(&h.core.store().clips().await), ["keep.mp4"]);
        assert!(pushed(&mut h.updates).is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_changes_push_latest() {
        let mut h = harness();
        let clips_dir = tempfile::tempdir().unwrap();
        h.core
            .set_folder(clips_dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        pushed(&mut h.updates);
        let generation = h.core.generation;

        touch(clips_dir.path(), "one.mp4", 100);
        assert!(h.core.handle_event(DaemonEvent::FolderChanged { generation }).await);
        touch(clips_dir.path(), "two.webm", 200);
        assert!(h.core.handle_event(DaemonEvent::FolderChanged { generation }).await);

        let pushes = pushed(&mut h.updates);
        assert_eq!(pushes.len(), 2);
        assert_eq!(names(&pushes[0]), ["one.mp4"]);
        assert_eq!(names(pushes.last().unwrap()), ["two.webm", "one.mp4"]);
        assert_eq!(names(&h.core.store().clips().await), ["two.webm", "one.mp4"]);
    }

    #[tokio::test]
    async fn test_stale_watch_events_ignored() {
        let mut h = harness();
        let clips_dir = tempfile::tempdir().unwrap();
        h.core
            .set_folder(clips_dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        pushed(&mut h.updates);

        let stale = h.core.generation - 1;
        assert!(h.core.handle_event(DaemonEvent::FolderChanged { generation: stale }).await);
        assert!(pushed(&mut h.updates).is_empty());
    }

    #[tokio::test]
    async fn test_vanished_folder_scans_empty() {
        let mut h = harness();
        let clips_dir = tempfile::tempdir().unwrap();
        touch(clips_dir.path(), "a.mp4", 1);
        h.core
            .set_folder(clips_dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        assert_eq!(h.core.store().clips().await.len(), 1);

        let path = clips_dir.path().to_path_buf();
        drop(clips_dir);
        assert!(!path.exists());

        let clips = h.core.rescan().await;
        assert!(clips.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_and_shutdown_events() {
        let mut h = harness();
        let (reply, rx) = oneshot::channel();
        assert!(h.core.handle_event(DaemonEvent::Refresh { reply }).await);
        assert!(rx.await.unwrap().is_empty());

        let (reply, rx) = oneshot::channel();
        assert!(
            h.core
                .handle_event(DaemonEvent::SetFolder {
                    path: "/nope/nope".to_string(),
                    reported: None,
                    reply,
                })
                .await
        );
        assert!(matches!(
            rx.await.unwrap(),
            Err(ServiceError::InvalidFolder(_))
        ));

        assert!(!h.core.handle_event(DaemonEvent::Shutdown).await);
    }

    #[tokio::test]
    async fn test_start_resumes_persisted_folder() {
        let data = tempfile::tempdir().unwrap();
        let clips_dir = tempfile::tempdir().unwrap();
        touch(clips_dir.path(), "old.mov", 5);
        let record = data.path().join("folder.json");
        std::fs::write(
            &record,
            serde_json::to_string(&FolderConfig {
                clips_folder: Some(clips_dir.path().to_path_buf()),
            })
            .unwrap(),
        )
        .unwrap();

        let (broadcast_tx, _rx) = broadcast::channel(4);
        let (event_tx, _events) = mpsc::channel(4);
        let mut core = DaemonCore::new(record, broadcast_tx, event_tx);
        core.start().await;

        assert!(core.watcher.is_some());
        assert_eq!(names(&core.store().clips().await), ["old.mov"]);
    }
}
