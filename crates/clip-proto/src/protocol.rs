use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One video file in the watched folder.
///
/// Built fresh on every scan and never mutated afterwards; a new scan
/// replaces the whole list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Clip {
    /// File name, unique within one scan.
    pub name: String,
    /// Absolute path when the daemon scanned it, best effort otherwise.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified: i64,
}

impl Clip {
    /// Upper-cased extension, e.g. "MP4".  Empty when the name has none.
    pub fn format_label(&self) -> String {
        std::path::Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_uppercase())
            .unwrap_or_default()
    }
}

/// Messages pushed from the daemon to display clients over `/ws`.
///
/// Wire shape: `{"type": "clips", "data": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum PushMessage {
    Clips(Vec<Clip>),
}

impl PushMessage {
    pub fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The persisted folder record, also returned by `GET /api/config`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FolderConfig {
    #[serde(default)]
    pub clips_folder: Option<PathBuf>,
}

/// Body of `POST /api/config`.
///
/// `clips_list` is the folder source's own listing, sent once as a
/// courtesy.  The daemon rescans on its own and only counts it, so the
/// entries are kept untyped and any shape is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFolderRequest {
    #[serde(default)]
    pub clips_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clips_list: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetFolderResponse {
    pub success: bool,
    pub config: FolderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub clips: Vec<Clip>,
}

/// Error body for every failed API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}
