//! `turnrelay-server` — WebSocket host for the voice-conversation core.
//!
//! Accepts upgrades on `/ws` and, for each accepted connection, constructs
//! a fresh [`turnrelay_core::Service`] wired to a demo recognizer and
//! synthesis pipeline, then drives it to completion.

mod config;
mod ws_transport;

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::info;

use turnrelay_core::recognizer::{EchoRecognizer, RecognizerHandle};
use turnrelay_core::service::Service;
use turnrelay_core::synthesis::{SynthesisPipeline, ToneSynthesis};

use crate::config::ServerConfig;

#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::default_config_path();
    let config = config::load_config(&config_path);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.parse().unwrap()),
        )
        .init();

    info!(bind_addr = %config.bind_addr, "turnrelay-server starting");

    let state = AppState {
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, state: AppState) {
    info!("connection accepted");
    let transport = ws_transport::split(socket);
    let recognizer = RecognizerHandle::new(EchoRecognizer::new());
    let pipeline: Arc<dyn SynthesisPipeline> = Arc::new(ToneSynthesis::new());

    let service = Service::new(
        transport,
        recognizer,
        pipeline,
        Some(state.config.audio_buffer_capacity),
    );
    service.run().await;
    info!("connection closed");
}
