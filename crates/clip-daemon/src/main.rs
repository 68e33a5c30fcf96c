mod core;
mod error;
mod http;
mod push;
mod state;
mod watcher;

use std::sync::Arc;

use clip_proto::config::Config;
use clip_proto::protocol::Clip;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// A fresh scan finished; the full, sorted list.
    ClipsUpdated(Arc<Vec<Clip>>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = clip_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,clip_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(64);

    // Event channel: the API and the folder watcher funnel into DaemonCore
    let (event_tx, event_rx) = mpsc::channel::<core::DaemonEvent>(256);

    let mut daemon_core = core::DaemonCore::new(
        config.paths.folder_file.clone(),
        broadcast_tx.clone(),
        event_tx.clone(),
    );
    daemon_core.start().await;

    let http_state = http::HttpState::new(daemon_core.store(), event_tx.clone(), broadcast_tx);
    let app = http::router(http_state, config.server.static_dir.clone());
    let _http_handle =
        http::start_server(config.server.bind_address.clone(), config.server.port, app);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            let _ = event_tx.send(core::DaemonEvent::Shutdown).await;
        }
    });

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
