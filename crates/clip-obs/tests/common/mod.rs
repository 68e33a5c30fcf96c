//! In-memory stand-in for an OBS WebSocket server.
//!
//! The client and the mock talk over a `tokio::io::duplex` pipe, so tests
//! run without sockets and work under a paused clock.

#![allow(dead_code)]

use clip_obs::ObsClient;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub type Ws = WebSocketStream<DuplexStream>;

/// How the mock answers one request.
pub enum Reply {
    Ok(Value),
    Fail(u16, &'static str),
    Silent,
}

pub struct MockObs {
    ws: Ws,
}

/// Client-side stream plus the mock server holding the other end.
pub async fn pair() -> (Ws, MockObs) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    (client, MockObs { ws: server })
}

/// A client that already completed the handshake.
pub async fn ready_client() -> (ObsClient, MockObs) {
    let (ws, mut obs) = pair().await;
    let client = ObsClient::new();
    let (connected, _identify) = tokio::join!(client.connect_with(ws, None), obs.handshake(false));
    connected.expect("handshake");
    (client, obs)
}

impl MockObs {
    pub async fn send(&mut self, value: Value) {
        let _ = self.ws.send(Message::Text(value.to_string())).await;
    }

    /// Next JSON frame from the client, or None once it hung up.
    pub async fn recv(&mut self) -> Option<Value> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    }

    pub async fn hello(&mut self, auth_required: bool) {
        let mut d = json!({ "obsWebSocketVersion": "5.1.0", "rpcVersion": 1 });
        if auth_required {
            d["authentication"] = json!({
                "challenge": "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
                "salt": "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=",
            });
        }
        self.send(json!({ "op": 0, "d": d })).await;
    }

    /// Hello → Identify → Identified.  Returns the Identify frame.
    pub async fn handshake(&mut self, auth_required: bool) -> Value {
        self.hello(auth_required).await;
        let identify = self.recv().await.expect("identify frame");
        self.send(json!({ "op": 2, "d": { "negotiatedRpcVersion": 1 } }))
            .await;
        identify
    }

    pub async fn respond(&mut self, request: &Value, reply: Reply) {
        let request_type = request["d"]["requestType"].clone();
        let request_id = request["d"]["requestId"].clone();
        let d = match reply {
            Reply::Ok(data) => json!({
                "requestType": request_type,
                "requestId": request_id,
                "requestStatus": { "result": true, "code": 100 },
                "responseData": data,
            }),
            Reply::Fail(code, comment) => json!({
                "requestType": request_type,
                "requestId": request_id,
                "requestStatus": { "result": false, "code": code, "comment": comment },
            }),
            Reply::Silent => return,
        };
        self.send(json!({ "op": 7, "d": d })).await;
    }

    pub async fn event(&mut self, event_type: &str, data: Value) {
        self.send(json!({
            "op": 5,
            "d": { "eventType": event_type, "eventIntent": 4, "eventData": data },
        }))
        .await;
    }

    /// Answer every request with `responder` until the client hangs up.
    /// Resolves to the (requestType, requestData) pairs seen, in order.
    pub fn serve<F>(mut self, mut responder: F) -> JoinHandle<Vec<(String, Value)>>
    where
        F: FnMut(&str, &Value) -> Reply + Send + 'static,
    {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(frame) = self.recv().await {
                if frame["op"] != 6 {
                    continue;
                }
                let request_type = frame["d"]["requestType"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let data = frame["d"]["requestData"].clone();
                let reply = responder(&request_type, &data);
                seen.push((request_type, data));
                self.respond(&frame, reply).await;
            }
            seen
        })
    }
}
