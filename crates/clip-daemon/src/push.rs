//! `/ws` push channel.
//!
//! Each display gets the current list as soon as it connects, then every
//! new list the core broadcasts.  Displays never send anything we act on.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use clip_proto::protocol::{Clip, PushMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::http::HttpState;
use crate::state::ClipStore;
use crate::BroadcastMessage;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<HttpState>) -> Response {
    ws.on_upgrade(move |socket| handle_display(socket, state))
}

async fn handle_display(socket: WebSocket, state: HttpState) {
    let id = state.next_display.fetch_add(1, Ordering::Relaxed) + 1;
    let count = state.displays.fetch_add(1, Ordering::Relaxed) + 1;
    info!("Display {} connected ({} total)", id, count);

    run_display(socket, &state, id).await;

    let count = state.displays.fetch_sub(1, Ordering::Relaxed) - 1;
    info!("Display {} disconnected ({} total)", id, count);
}

async fn run_display(socket: WebSocket, state: &HttpState, id: usize) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the snapshot so no update falls in between.
    let mut updates = state.broadcast_tx.subscribe();

    let snapshot = state.store.snapshot().await;
    debug!(
        "Display {} starts at rev {} ({:?})",
        id, snapshot.rev, snapshot.folder
    );
    if send_clips(&mut sender, &snapshot.clips).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = updates.recv() => {
                let Some(clips) = list_to_send(msg, &state.store, id).await else { break };
                if send_clips(&mut sender, &clips).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Display {} read error: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// List to push for one broadcast receive, or `None` once the core has
/// gone away.
///
/// A display that fell behind skips the backlog and gets the store's
/// current list instead.
async fn list_to_send(
    msg: Result<BroadcastMessage, broadcast::error::RecvError>,
    store: &ClipStore,
    id: usize,
) -> Option<Arc<Vec<Clip>>> {
    match msg {
        Ok(BroadcastMessage::ClipsUpdated(clips)) => Some(clips),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("Display {} missed {} updates, resending list", id, n);
            Some(store.clips().await)
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}

async fn send_clips(
    sender: &mut SplitSink<WebSocket, Message>,
    clips: &[Clip],
) -> anyhow::Result<()> {
    let text = PushMessage::Clips(clips.to_vec()).encode()?;
    sender.send(Message::Text(text)).await?;
    Ok(())
}
