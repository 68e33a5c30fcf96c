use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clip_proto::protocol::{
    ApiError, Clip, FolderConfig, RefreshResponse, SetFolderRequest, SetFolderResponse,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::core::DaemonEvent;
use crate::error::ServiceError;
use crate::push;
use crate::state::ClipStore;
use crate::BroadcastMessage;

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<ClipStore>,
    pub event_tx: mpsc::Sender<DaemonEvent>,
    pub broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Connected push-channel displays.
    pub displays: Arc<AtomicUsize>,
    pub next_display: Arc<AtomicUsize>,
}

impl HttpState {
    pub fn new(
        store: Arc<ClipStore>,
        event_tx: mpsc::Sender<DaemonEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> Self {
        Self {
            store,
            event_tx,
            broadcast_tx,
            displays: Arc::new(AtomicUsize::new(0)),
            next_display: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::InvalidFolder(_) | ServiceError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ApiError {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: HttpState, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/clips", get(get_clips))
        .route("/api/refresh", post(refresh))
        .route("/ws", get(push::ws_handler))
        .with_state(state);

    if let Some(dir) = static_dir {
        info!("Serving static UI from {:?}", dir);
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
}

pub fn start_server(bind_address: String, port: u16, app: Router) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_config(State(state): State<HttpState>) -> Json<FolderConfig> {
    Json(state.store.folder_config().await)
}

async fn set_config(
    State(state): State<HttpState>,
    payload: Result<Json<SetFolderRequest>, JsonRejection>,
) -> Result<Json<SetFolderResponse>, ServiceError> {
    let Json(req) = payload.map_err(|rej| ServiceError::BadRequest(rej.body_text()))?;
    info!("HTTP API: set folder {:?}", req.clips_folder);
    let (reply, rx) = oneshot::channel();
    let evt = DaemonEvent::SetFolder {
        // Missing and null both fail validation as "required".
        path: req.clips_folder.unwrap_or_default(),
        reported: req.clips_list.as_ref().map(Vec::len),
        reply,
    };
    state
        .event_tx
        .send(evt)
        .await
        .map_err(|_| ServiceError::Unavailable)?;
    let config = rx.await.map_err(|_| ServiceError::Unavailable)??;
    Ok(Json(SetFolderResponse {
        success: true,
        config,
    }))
}

async fn get_clips(State(state): State<HttpState>) -> Json<Vec<Clip>> {
    Json(state.store.clips().await.to_vec())
}

async fn refresh(State(state): State<HttpState>) -> Result<Json<RefreshResponse>, ServiceError> {
    info!("HTTP API: refresh");
    let (reply, rx) = oneshot::channel();
    state
        .event_tx
        .send(DaemonEvent::Refresh { reply })
        .await
        .map_err(|_| ServiceError::Unavailable)?;
    let clips = rx.await.map_err(|_| ServiceError::Unavailable)?;
    Ok(Json(RefreshResponse {
        success: true,
        clips: clips.to_vec(),
    }))
}
