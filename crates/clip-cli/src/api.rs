//! Talking to clip-daemon: the HTTP API plus the `/ws` push channel.

use anyhow::{bail, Context};
use clip_proto::protocol::{
    ApiError, Clip, FolderConfig, PushMessage, RefreshResponse, SetFolderRequest,
    SetFolderResponse,
};
use futures_util::StreamExt;
use reqwest::{Client, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

pub struct DaemonApi {
    client: Client,
    base_url: String,
}

impl DaemonApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `ws://` URL of the push channel.
    pub fn push_url(&self) -> String {
        let rest = self
            .base_url
            .strip_prefix("https://")
            .map(|r| format!("wss://{}", r))
            .or_else(|| {
                self.base_url
                    .strip_prefix("http://")
                    .map(|r| format!("ws://{}", r))
            })
            .unwrap_or_else(|| format!("ws://{}", self.base_url));
        format!("{}/ws", rest)
    }

    pub async fn config(&self) -> anyhow::Result<FolderConfig> {
        let resp = self.client.get(self.url("/api/config")).send().await;
        decode(self.reachable(resp)?).await
    }

    pub async fn set_folder(
        &self,
        folder: &str,
        clips: Option<Vec<Clip>>,
    ) -> anyhow::Result<FolderConfig> {
        let clips_list = clips
            .map(|clips| clips.iter().map(serde_json::to_value).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        let body = SetFolderRequest {
            clips_folder: Some(folder.to_string()),
            clips_list,
        };
        let resp = self
            .client
            .post(self.url("/api/config"))
            .json(&body)
            .send()
            .await;
        let resp: SetFolderResponse = decode(self.reachable(resp)?).await?;
        Ok(resp.config)
    }

    pub async fn clips(&self) -> anyhow::Result<Vec<Clip>> {
        let resp = self.client.get(self.url("/api/clips")).send().await;
        decode(self.reachable(resp)?).await
    }

    pub async fn refresh(&self) -> anyhow::Result<Vec<Clip>> {
        let resp = self.client.post(self.url("/api/refresh")).send().await;
        let resp: RefreshResponse = decode(self.reachable(resp)?).await?;
        Ok(resp.clips)
    }

    /// Call `on_clips` with the current list, then with every pushed list,
    /// until the daemon closes the channel.
    pub async fn follow<F>(&self, mut on_clips: F) -> anyhow::Result<()>
    where
        F: FnMut(Vec<Clip>),
    {
        let url = self.push_url();
        let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("cannot open push channel at {}", url))?;
        debug!("push channel open: {}", url);

        while let Some(msg) = ws.next().await {
            match msg? {
                Message::Text(text) => match PushMessage::decode(&text) {
                    Ok(PushMessage::Clips(clips)) => on_clips(clips),
                    Err(e) => debug!("ignoring push frame: {}", e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn reachable(&self, resp: reqwest::Result<Response>) -> anyhow::Result<Response> {
        resp.with_context(|| format!("cannot reach clip-daemon at {}", self.base_url))
    }
}

/// Body as `T`, or the daemon's `{"error"}` message on a non-2xx status.
async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> anyhow::Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let message = match resp.json::<ApiError>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        bail!("daemon: {}", message);
    }
    Ok(resp.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url() {
        assert_eq!(
            DaemonApi::new("http://127.0.0.1:3000").push_url(),
            "ws://127.0.0.1:3000/ws"
        );
        assert_eq!(
            DaemonApi::new("https://clips.local/").push_url(),
            "wss://clips.local/ws"
        );
        assert_eq!(DaemonApi::new("host:3000").push_url(), "ws://host:3000/ws");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_names_url() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let base = format!("http://127.0.0.1:{}", port);
        let err = DaemonApi::new(base.clone()).clips().await.unwrap_err();
        assert!(err.to_string().contains(&base));
    }
}
