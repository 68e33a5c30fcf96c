//! Folder source: turns a directory listing into a sorted clip list.
//!
//! Both the daemon (on every rescan) and `clipctl set-folder` (for the
//! one-shot handoff) go through here, so they agree on what a clip is.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::Clip;

/// Extensions recognised as video clips.  Matched case-insensitively.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "m4v"];

/// A bare `.mp4` counts too: only the suffix is looked at.
pub fn is_video_file(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| {
        name.strip_suffix(ext)
            .is_some_and(|stem| stem.ends_with('.'))
    })
}

/// Raw metadata for one directory entry, before filtering.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Filter `entries` to video files and order them newest first.
///
/// Ties on modification time fall back to name order so repeated scans of
/// an unchanged folder produce identical lists.
pub fn clips_from_entries<I>(entries: I) -> Vec<Clip>
where
    I: IntoIterator<Item = FileEntry>,
{
    let mut clips: Vec<Clip> = entries
        .into_iter()
        .filter(|e| is_video_file(&e.name))
        .map(|e| Clip {
            name: e.name,
            path: e.path.to_string_lossy().into_owned(),
            size: e.size,
            modified: epoch_millis(e.modified),
        })
        .collect();
    sort_newest_first(&mut clips);
    clips
}

pub fn sort_newest_first(clips: &mut [Clip]) {
    clips.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
}

/// List `dir` (one level, no recursion) and build its clip list.
///
/// Entries that vanish or cannot be stat'ed between the listing and the
/// stat are skipped.  Failure to open the directory itself is returned.
pub fn scan_folder(dir: &Path) -> std::io::Result<Vec<Clip>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("scan: skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_video_file(&name) {
            continue;
        }
        let meta = match std::fs::metadata(entry.path()) {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("scan: stat failed for {}: {}", name, e);
                continue;
            }
        };
        entries.push(FileEntry {
            name,
            path: entry.path(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
        });
    }
    Ok(clips_from_entries(entries))
}

fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
