//! Top-down shooter relay server
//!
//! Entry point. Clients connect to the default WebSocket channel to create or
//! locate a room, then reconnect to that room's dedicated channel where their
//! actions are relayed to everyone else in the room.

mod app;
mod config;
mod http;
mod lobby;
mod room;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::room::RoomManager;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);
    init_server_time();

    info!("Starting relay server");

    let state = AppState::new(config.clone());
    let rooms = Arc::clone(&state.rooms);
    let router = build_router(state);

    let addr: SocketAddr = config.server_addr;
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            // Keep the process alive without service rather than exiting
            error!(error = %e, %addr, "Failed to bind listener");
            shutdown_signal(rooms).await;
            return Ok(());
        }
    };

    info!("Server listening on {}", addr);
    info!("Lobby endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(rooms))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Name of the first termination signal received
async fn wait_for_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Resolves on the first termination signal. Rooms are in-memory only, so
/// whatever is still open is lost; log how much.
async fn shutdown_signal(rooms: Arc<RoomManager>) {
    let signal = wait_for_signal().await;
    info!(
        signal,
        open_rooms = rooms.active_rooms(),
        "Shutting down, open rooms will be dropped"
    );
}
