//! Put a clip into the OBS preview scene.
//!
//! A fixed media input is created in the preview scene on first use and
//! re-pointed at the new file afterwards.  This is a plain two-step
//! fallback: create, and if that fails for any reason, update in place.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::ObsClient;
use crate::error::ObsError;

/// The media input that receives previewed clips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSource {
    pub input_name: String,
    pub input_kind: String,
}

impl Default for PreviewSource {
    fn default() -> Self {
        Self {
            input_name: "ReplaySource".to_string(),
            input_kind: "ffmpeg_source".to_string(),
        }
    }
}

impl PreviewSource {
    pub fn new(input_name: impl Into<String>, input_kind: impl Into<String>) -> Self {
        Self {
            input_name: input_name.into(),
            input_kind: input_kind.into(),
        }
    }
}

fn scene_name(
    response: &Value,
    request_type: &'static str,
    field: &'static str,
) -> Result<String, ObsError> {
    response
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ObsError::MissingField {
            request_type,
            field,
        })
}

impl ObsClient {
    pub async fn current_program_scene(&self) -> Result<String, ObsError> {
        let response = self
            .issue_command("GetCurrentProgramScene", json!({}))
            .await?;
        scene_name(&response, "GetCurrentProgramScene", "currentProgramSceneName")
    }

    /// The preview scene in studio mode, otherwise the program scene.
    pub async fn current_preview_scene(&self) -> Result<String, ObsError> {
        let preview = self
            .issue_command("GetCurrentPreviewScene", json!({}))
            .await
            .and_then(|r| {
                scene_name(&r, "GetCurrentPreviewScene", "currentPreviewSceneName")
            });
        match preview {
            Ok(name) => Ok(name),
            Err(e) => {
                debug!("obs: no preview scene ({}), using program scene", e);
                self.current_program_scene().await
            }
        }
    }

    pub async fn set_source_in_preview(&self, file_path: &str) -> Result<(), ObsError> {
        self.set_source_in_preview_with(&PreviewSource::default(), file_path)
            .await
    }

    pub async fn set_source_in_preview_with(
        &self,
        source: &PreviewSource,
        file_path: &str,
    ) -> Result<(), ObsError> {
        let scene = self.current_preview_scene().await?;
        let settings = json!({ "local_file": file_path, "looping": false });

        let created = self
            .issue_command(
                "CreateInput",
                json!({
                    "sceneName": scene,
                    "inputName": source.input_name,
                    "inputKind": source.input_kind,
                    "inputSettings": settings,
                }),
            )
            .await;

        match created {
            Ok(_) => {
                info!(
                    "obs: created {} in scene {} -> {}",
                    source.input_name, scene, file_path
                );
                Ok(())
            }
            Err(e) => {
                debug!(
                    "obs: CreateInput {} failed ({}), updating settings",
                    source.input_name, e
                );
                self.issue_command(
                    "SetInputSettings",
                    json!({
                        "inputName": source.input_name,
                        "inputSettings": settings,
                    }),
                )
                .await?;
                info!("obs: updated {} -> {}", source.input_name, file_path);
                Ok(())
            }
        }
    }
}
