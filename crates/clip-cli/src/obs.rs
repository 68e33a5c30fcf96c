use anyhow::{bail, Context};
use chrono::Local;
use clip_obs::{ConnectionState, ObsClient, PreviewSource};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

/// Subscribed to by `clipctl events` when no types are given.
pub const DEFAULT_EVENTS: &[&str] = &[
    "CurrentProgramSceneChanged",
    "CurrentPreviewSceneChanged",
    "InputCreated",
    "InputRemoved",
    "MediaInputPlaybackEnded",
    "ReplayBufferSaved",
];

/// Where and how to reach OBS.
#[derive(Debug, Clone)]
pub struct ObsTarget {
    pub address: String,
    pub password: Option<String>,
    pub source: PreviewSource,
}

async fn connect(target: &ObsTarget) -> anyhow::Result<ObsClient> {
    let client = ObsClient::new();
    client
        .connect(&target.address, target.password.as_deref())
        .await
        .with_context(|| format!("cannot connect to OBS at {}", target.address))?;
    info!("connected to OBS at {}", target.address);
    Ok(client)
}

pub async fn preview(target: &ObsTarget, clip_path: &str) -> anyhow::Result<()> {
    let client = connect(target).await?;
    let result = client
        .set_source_in_preview_with(&target.source, clip_path)
        .await;
    client.disconnect().await;
    result.context("OBS refused the clip")
}

fn event_list(requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        DEFAULT_EVENTS.iter().map(|s| s.to_string()).collect()
    } else {
        requested.to_vec()
    }
}

pub fn format_event(event_type: &str, data: &Value) -> String {
    let stamp = Local::now().format("%H:%M:%S");
    if data.is_null() || data.as_object().is_some_and(|o| o.is_empty()) {
        format!("{} {}", stamp, event_type)
    } else {
        format!("{} {} {}", stamp, event_type, data)
    }
}

/// Print events until Ctrl-C or until OBS goes away.
pub async fn watch_events(target: &ObsTarget, requested: &[String]) -> anyhow::Result<()> {
    let client = connect(target).await?;
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, Value)>();

    for event_type in event_list(requested) {
        let tx = tx.clone();
        let name = event_type.clone();
        client.subscribe(&event_type, move |data| {
            let _ = tx.send((name.clone(), data.clone()));
        });
    }
    drop(tx);

    let mut state = client.watch_state();
    loop {
        tokio::select! {
            Some((event_type, data)) = rx.recv() => {
                println!("{}", format_event(&event_type, &data));
            }
            _ = state.wait_for(|s| *s == ConnectionState::Closed) => {
                bail!("OBS closed the connection");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.disconnect().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_list_defaults() {
        assert_eq!(event_list(&[]).len(), DEFAULT_EVENTS.len());
        assert_eq!(
            event_list(&["SceneCreated".to_string()]),
            vec!["SceneCreated".to_string()]
        );
    }

    #[test]
    fn test_format_event() {
        let line = format_event("ReplayBufferSaved", &json!({ "savedReplayPath": "/r/1.mkv" }));
        assert!(line.ends_with("ReplayBufferSaved {\"savedReplayPath\":\"/r/1.mkv\"}"));
        assert!(format_event("ExitStarted", &json!({})).ends_with(" ExitStarted"));
    }
}
