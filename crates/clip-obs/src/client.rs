//! OBS WebSocket session with separated reader/writer tasks.
//!
//! Architecture:
//!
//! ```text
//!   ObsClient::connect()
//!         │
//!         ├── writer_task   ← receives Message via mpsc, forwards → socket
//!         └── reader_task   ← reads JSON frames from socket
//!                                ├── Hello / Identified        → handshake state machine
//!                                ├── RequestResponse (requestId) → matched oneshot::Sender
//!                                └── Event                      → registered handlers, in order
//! ```
//!
//! Public API:
//!   - `ObsClient`: cheaply cloneable.  `issue_command()` returns a `Future<Value>`.
//!   - `subscribe()` / `unsubscribe()`: event handlers keyed by event type.
//!
//! Closing the session (remote close, transport error or `disconnect()`)
//! rejects every in-flight request at once with `ConnectionClosed`.
//! There is no automatic reconnect.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::error::ObsError;
use crate::protocol::{
    Event, Frame, Hello, Identified, Identify, OpCode, Request, RequestResponse, RPC_VERSION,
};

/// Bound on reaching Ready, transport setup included.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on waiting for one request's response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    AwaitingHello,
    Identifying,
    Ready,
    Closed,
}

/// Token returned by [`ObsClient::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ── internal types ────────────────────────────────────────────────────────────

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

struct PendingRequest {
    request_type: String,
    reply: oneshot::Sender<Result<Value, ObsError>>,
}

#[derive(Default)]
struct HandlerRegistry {
    next_id: u64,
    by_event: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

/// Live transport of the current session.
struct Session {
    outbound: mpsc::Sender<Message>,
    reader: JoinHandle<()>,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    pending: Mutex<HashMap<String, PendingRequest>>,
    handlers: StdMutex<HandlerRegistry>,
    next_request: AtomicU64,
    /// Bumped per session so a stale reader cannot close its successor.
    generation: AtomicU64,
    session: Mutex<Option<Session>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("obs: {:?} -> {:?}", prev, next);
        }
    }

    async fn fail_pending(&self, reason: &str) {
        let mut map = self.pending.lock().await;
        for (request_id, pending) in map.drain() {
            debug!("obs: abandoning {} ({})", request_id, pending.request_type);
            let _ = pending
                .reply
                .send(Err(ObsError::ConnectionClosed(reason.to_string())));
        }
    }

    fn handlers_for(&self, event_type: &str) -> Vec<Handler> {
        let registry = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        registry
            .by_event
            .get(event_type)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}

// ── public client ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ObsClient {
    shared: Arc<Shared>,
}

impl Default for ObsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ObsClient {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                state,
                pending: Mutex::new(HashMap::new()),
                handlers: StdMutex::new(HandlerRegistry::default()),
                next_request: AtomicU64::new(1),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Number of requests still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    /// Open a WebSocket to `address` (e.g. `ws://127.0.0.1:4455`) and run the
    /// handshake.  Any previous session is closed first.
    pub async fn connect(&self, address: &str, credential: Option<&str>) -> Result<(), ObsError> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        info!("obs: connecting to {}", address);

        let ws = match tokio::time::timeout_at(deadline, tokio_tungstenite::connect_async(address))
            .await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!("obs: transport to {} failed: {}", address, e);
                return Err(ObsError::Connection(e.to_string()));
            }
            Err(_) => return Err(ObsError::HandshakeTimeout(HANDSHAKE_TIMEOUT)),
        };

        self.attach(ws, credential, deadline).await
    }

    /// Run the handshake over an already-open WebSocket stream.
    pub async fn connect_with<S>(&self, stream: S, credential: Option<&str>) -> Result<(), ObsError>
    where
        S: Stream<Item = Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        self.attach(stream, credential, Instant::now() + HANDSHAKE_TIMEOUT)
            .await
    }

    async fn attach<S>(
        &self,
        stream: S,
        credential: Option<&str>,
        deadline: Instant,
    ) -> Result<(), ObsError>
    where
        S: Stream<Item = Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        self.disconnect().await;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sink, stream) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(64);
        let (handshake_tx, handshake_rx) = oneshot::channel();

        self.shared.set_state(ConnectionState::AwaitingHello);
        tokio::spawn(writer_task(sink, outbound_rx));
        let reader = tokio::spawn(reader_task(
            stream,
            Dispatcher {
                shared: Arc::clone(&self.shared),
                outbound: outbound_tx.clone(),
                credential: credential.filter(|c| !c.is_empty()).map(str::to_owned),
                handshake: Some(handshake_tx),
                generation,
            },
        ));
        *self.shared.session.lock().await = Some(Session {
            outbound: outbound_tx,
            reader,
        });

        let outcome = match tokio::time::timeout_at(deadline, handshake_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ObsError::Connection("handshake aborted".to_string())),
            Err(_) => Err(ObsError::HandshakeTimeout(HANDSHAKE_TIMEOUT)),
        };

        match outcome {
            Ok(()) => {
                info!("obs: session ready");
                Ok(())
            }
            Err(e) => {
                warn!("obs: connect failed: {}", e);
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// Close the session.  Calling it again, or without a session, is a no-op.
    pub async fn disconnect(&self) {
        let session = self.shared.session.lock().await.take();
        let Some(session) = session else {
            return;
        };
        session.reader.abort();
        drop(session.outbound);
        self.shared.set_state(ConnectionState::Closed);
        self.shared.fail_pending("disconnected").await;
        info!("obs: disconnected");
    }

    /// Send one request and wait for its response data.
    pub async fn issue_command(
        &self,
        request_type: &str,
        request_data: Value,
    ) -> Result<Value, ObsError> {
        if !self.is_ready() {
            return Err(ObsError::NotConnected);
        }
        let outbound = self
            .shared
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.outbound.clone())
            .ok_or(ObsError::NotConnected)?;

        let request_id = format!(
            "req-{}",
            self.shared.next_request.fetch_add(1, Ordering::Relaxed)
        );
        let message = Frame::new(
            OpCode::Request,
            &Request {
                request_type,
                request_id: &request_id,
                request_data,
            },
        )?
        .to_message()?;

        let (reply_tx, mut reply_rx) = oneshot::channel();
        // Register before writing so the reader can always match the response.
        self.shared.pending.lock().await.insert(
            request_id.clone(),
            PendingRequest {
                request_type: request_type.to_string(),
                reply: reply_tx,
            },
        );

        debug!("obs: send {} req={}", request_type, request_id);
        if outbound.send(message).await.is_err() {
            self.shared.pending.lock().await.remove(&request_id);
            return Err(ObsError::NotConnected);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, &mut reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ObsError::ConnectionClosed(
                "reply channel dropped".to_string(),
            )),
            Err(_) => {
                let expired = self.shared.pending.lock().await.remove(&request_id);
                if expired.is_some() {
                    warn!("obs: {} req={} timed out", request_type, request_id);
                    return Err(ObsError::RequestTimeout {
                        request_type: request_type.to_string(),
                        request_id,
                    });
                }
                // The reader answered just as the timer fired.
                reply_rx.try_recv().unwrap_or_else(|_| {
                    Err(ObsError::RequestTimeout {
                        request_type: request_type.to_string(),
                        request_id,
                    })
                })
            }
        }
    }

    /// Register `handler` for `event_type`.  Handlers run on the reader task
    /// in registration order, so they must not block.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self
            .shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .by_event
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        debug!("obs: subscribed {:?} to {}", id, event_type);
        id
    }

    /// Remove a handler.  Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self
            .shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        registry.by_event.retain(|_, list| {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }
}

// ── reader side ───────────────────────────────────────────────────────────────

/// Per-session state owned by the reader task.
struct Dispatcher {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<Message>,
    credential: Option<String>,
    handshake: Option<oneshot::Sender<Result<(), ObsError>>>,
    generation: u64,
}

impl Dispatcher {
    async fn dispatch(&mut self, frame: Frame) -> Result<(), ObsError> {
        match frame.opcode() {
            Ok(OpCode::Hello) => self.on_hello(frame.payload()?).await,
            Ok(OpCode::Identified) => {
                self.on_identified(frame.payload()?);
                Ok(())
            }
            Ok(OpCode::Event) => {
                self.on_event(frame.payload()?);
                Ok(())
            }
            Ok(OpCode::RequestResponse) => {
                self.on_response(frame.payload()?).await;
                Ok(())
            }
            Ok(op) => {
                debug!("obs reader: ignoring {:?} from server", op);
                Ok(())
            }
            Err(op) => {
                debug!("obs reader: ignoring unknown op={}", op);
                Ok(())
            }
        }
    }

    async fn on_hello(&mut self, hello: Hello) -> Result<(), ObsError> {
        let state = self.shared.state();
        if state != ConnectionState::AwaitingHello {
            warn!("obs reader: unexpected Hello in {:?}", state);
            return Ok(());
        }
        debug!(
            "obs reader: hello version={:?} auth={}",
            hello.obs_web_socket_version,
            hello.authentication.is_some()
        );

        let authentication = match (&hello.authentication, &self.credential) {
            (Some(_), Some(credential)) => Some(credential.clone()),
            (Some(_), None) => {
                warn!("obs: server requires authentication but no password was given");
                None
            }
            (None, _) => None,
        };
        let identify = Frame::new(
            OpCode::Identify,
            &Identify {
                rpc_version: RPC_VERSION,
                authentication,
            },
        )?;

        self.shared.set_state(ConnectionState::Identifying);
        if self.outbound.send(identify.to_message()?).await.is_err() {
            return Err(ObsError::Connection("writer task gone".to_string()));
        }
        Ok(())
    }

    fn on_identified(&mut self, identified: Identified) {
        let state = self.shared.state();
        if state != ConnectionState::Identifying {
            warn!("obs reader: unexpected Identified in {:?}", state);
            return;
        }
        debug!(
            "obs reader: identified rpc={:?}",
            identified.negotiated_rpc_version
        );
        self.shared.set_state(ConnectionState::Ready);
        if let Some(tx) = self.handshake.take() {
            let _ = tx.send(Ok(()));
        }
    }

    fn on_event(&self, event: Event) {
        let handlers = self.shared.handlers_for(&event.event_type);
        if handlers.is_empty() {
            debug!("obs reader: no handler for {}", event.event_type);
            return;
        }
        debug!(
            "obs reader: event {} -> {} handler(s)",
            event.event_type,
            handlers.len()
        );
        for handler in handlers {
            handler(&event.event_data);
        }
    }

    async fn on_response(&self, response: RequestResponse) {
        // Held until the reply is sent: a caller whose timer fires finds
        // either its entry still pending or its reply already delivered.
        let mut pending_map = self.shared.pending.lock().await;
        let Some(pending) = pending_map.remove(&response.request_id) else {
            debug!(
                "obs reader: response for unknown req={}",
                response.request_id
            );
            return;
        };

        let status = response.request_status;
        let result = if status.result {
            debug!("obs reader: response req={} ok", response.request_id);
            Ok(response.response_data)
        } else {
            let reason = status
                .comment
                .unwrap_or_else(|| "Request failed".to_string());
            debug!(
                "obs reader: response req={} code={:?} err={}",
                response.request_id, status.code, reason
            );
            Err(ObsError::RequestFailed {
                request_type: pending.request_type,
                code: status.code,
                reason,
            })
        };
        let _ = pending.reply.send(result);
    }

    fn reject_handshake(&mut self, err: ObsError) {
        if let Some(tx) = self.handshake.take() {
            let _ = tx.send(Err(err));
        }
    }

    async fn finish(mut self, reason: String) {
        self.reject_handshake(ObsError::Connection(reason.clone()));
        if self.shared.generation.load(Ordering::SeqCst) != self.generation {
            return;
        }
        let session = self.shared.session.lock().await.take();
        if session.is_none() {
            // disconnect() got here first
            return;
        }
        self.shared.set_state(ConnectionState::Closed);
        self.shared.fail_pending(&reason).await;
        info!("obs: session closed ({})", reason);
    }
}

async fn reader_task<S>(mut stream: S, mut dispatcher: Dispatcher)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame = match Frame::parse(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        debug!("obs reader: invalid json '{}': {}", text, e);
                        continue;
                    }
                };
                if let Err(e) = dispatcher.dispatch(frame).await {
                    warn!("obs reader: {}", e);
                }
            }
            Some(Ok(Message::Close(close))) => {
                break match close {
                    Some(frame) => format!(
                        "closed by OBS ({}: {})",
                        u16::from(frame.code),
                        frame.reason
                    ),
                    None => "closed by OBS".to_string(),
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("obs reader: transport error: {}", e);
                break e.to_string();
            }
            None => break "connection closed".to_string(),
        }
    };
    debug!("obs reader: {}", reason);
    dispatcher.finish(reason).await;
}

// ── writer side ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut sink: W, mut rx: mpsc::Receiver<Message>)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            warn!("obs writer: write error: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
    debug!("obs writer: task exiting");
}
