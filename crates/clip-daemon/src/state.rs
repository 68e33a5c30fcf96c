use std::path::{Path, PathBuf};
use std::sync::Arc;

use clip_proto::protocol::{Clip, FolderConfig};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Read-only view handed to the HTTP and push handlers.
#[derive(Debug, Clone, Default)]
pub struct ClipSnapshot {
    /// Bumped on every list replacement.
    pub rev: u64,
    pub folder: Option<PathBuf>,
    pub clips: Arc<Vec<Clip>>,
}

/// Holds the watched folder and the current clip list.
///
/// Only `DaemonCore` writes; everyone else reads snapshots.
pub struct ClipStore {
    state: RwLock<ClipSnapshot>,
    folder_file: PathBuf,
}

impl ClipStore {
    /// Loads the persisted folder, if any.  The clip list starts empty.
    pub fn new(folder_file: PathBuf) -> Self {
        let persisted = load_folder_record(&folder_file);
        Self {
            state: RwLock::new(ClipSnapshot {
                rev: 0,
                folder: persisted.clips_folder,
                clips: Arc::new(Vec::new()),
            }),
            folder_file,
        }
    }

    pub async fn snapshot(&self) -> ClipSnapshot {
        self.state.read().await.clone()
    }

    pub async fn folder(&self) -> Option<PathBuf> {
        self.state.read().await.folder.clone()
    }

    pub async fn folder_config(&self) -> FolderConfig {
        FolderConfig {
            clips_folder: self.folder().await,
        }
    }

    pub async fn clips(&self) -> Arc<Vec<Clip>> {
        Arc::clone(&self.state.read().await.clips)
    }

    /// Persist `folder`, then make it current.  On a write error the
    /// in-memory folder is left as it was.
    pub async fn set_folder(&self, folder: PathBuf) -> std::io::Result<()> {
        let record = FolderConfig {
            clips_folder: Some(folder.clone()),
        };
        save_folder_record(&self.folder_file, &record).await?;
        self.state.write().await.folder = Some(folder);
        Ok(())
    }

    /// Swap in a freshly scanned list.
    pub async fn replace_clips(&self, clips: Vec<Clip>) -> Arc<Vec<Clip>> {
        let clips = Arc::new(clips);
        let mut state = self.state.write().await;
        state.clips = Arc::clone(&clips);
        state.rev += 1;
        clips
    }
}

async fn save_folder_record(path: &Path, record: &FolderConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(record)?;
    tokio::fs::write(path, json).await?;
    debug!("saved folder record to {:?}", path);
    Ok(())
}

fn load_folder_record(path: &Path) -> FolderConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return FolderConfig::default(),
    };
    match serde_json::from_str::<FolderConfig>(&content) {
        Ok(record) => record,
        Err(e) => {
            warn!("ignoring unreadable folder record {:?}: {}", path, e);
            FolderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str) -> Clip {
        Clip {
            name: name.to_string(),
            path: format!("/clips/{}", name),
            size: 1,
            modified: 0,
        }
    }

    #[tokio::test]
    async fn test_folder_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("nested").join("folder.json");

        let store = ClipStore::new(record.clone());
        assert_eq!(store.folder().await, None);
        store.set_folder(PathBuf::from("/videos/replays")).await.unwrap();

        let reopened = ClipStore::new(record.clone());
        assert_eq!(
            reopened.folder().await,
            Some(PathBuf::from("/videos/replays"))
        );
        let on_disk = std::fs::read_to_string(&record).unwrap();
        assert!(on_disk.contains("\"clipsFolder\""));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("folder.json");
        std::fs::write(&record, "{ not json").unwrap();

        let store = ClipStore::new(record);
        assert_eq!(store.folder().await, None);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_previous_folder() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the record file should be makes the write fail.
        let record = dir.path().join("folder.json");
        std::fs::create_dir(&record).unwrap();

        let store = ClipStore::new(record);
        assert!(store.set_folder(PathBuf::from("/a")).await.is_err());
        assert_eq!(store.folder().await, None);
    }

    #[tokio::test]
    async fn test_replace_clips_bumps_rev() {
        let dir = tempfile::tempdir().unwrap();
        let store = ClipStore::new(dir.path().join("folder.json"));

        store.replace_clips(vec![clip("a.mp4")]).await;
        store.replace_clips(vec![clip("b.mp4"), clip("c.mp4")]).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.rev, 2);
        assert_eq!(snapshot.clips.len(), 2);
        assert_eq!(store.clips().await[0].name, "b.mp4");
    }
}
