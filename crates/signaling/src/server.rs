use crate::config::SignalingServerConfig;
use crate::registry::ConnectionRegistry;
use crate::router::{Inbound, RoomRouter};
use crate::transport::ChannelTransport;

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use shared::models::{ClientMessage, ConnectionId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    router: Arc<RoomRouter<ChannelTransport>>,
    transport: Arc<ChannelTransport>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    rooms: usize,
    notify_peer_left: bool,
}

pub async fn run_server(config: SignalingServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    serve(listener, config).await
}

/// Serves on an already bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, config: SignalingServerConfig) -> anyhow::Result<()> {
    let router = app(&config);
    info!(address = %listener.local_addr()?, "Starting signaling server");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("Signaling server stopped");
    Ok(())
}

pub fn app(config: &SignalingServerConfig) -> Router {
    let transport = Arc::new(ChannelTransport::with_capacity(config.outbound_queue_capacity));
    let router = Arc::new(RoomRouter::new(
        Arc::new(ConnectionRegistry::new()),
        transport.clone(),
        config.notify_peer_left,
    ));
    let state = AppState { router, transport };

    Router::new()
        .route("/", get(root))
        .route("/health", get(healthcheck))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
}

// Root handler for "/"
async fn root() -> impl IntoResponse {
    (StatusCode::OK, "Server OK!")
}

async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.router.registry().stats().await;
    let body = HealthResponse {
        status: "ok",
        connections: stats.connections,
        rooms: stats.rooms,
        notify_peer_left: state.router.notify_peer_left(),
    };
    (StatusCode::OK, Json(body))
}

#[instrument(skip(state, ws))]
async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, remote))
}

async fn handle_ws(socket: WebSocket, state: AppState, remote: SocketAddr) {
    let connection_id: ConnectionId = Uuid::new_v4();
    let mut outbound = state.transport.attach(connection_id);
    if let Err(err) = state.router.dispatch(connection_id, Inbound::Connect).await {
        warn!(%connection_id, error = %err, "failed to register connection");
    }
    info!(%connection_id, %remote, "New client connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(err) => {
                    warn!(%connection_id, error = %err, "failed to encode outbound message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let reason = loop {
        let event = match stream.next().await {
            Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                Ok(message) => Inbound::Message(message),
                Err(err) => Inbound::Malformed {
                    raw: text,
                    error: err.to_string(),
                },
            },
            Some(Ok(Message::Binary(bytes))) => Inbound::Malformed {
                raw: format!("<{} bytes of binary>", bytes.len()),
                error: "binary frames are not supported".to_string(),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|frame| frame.reason.to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "client closed".to_string());
            }
            // axum answers pings itself
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Err(err)) => break format!("transport error: {err}"),
            None => break "connection dropped".to_string(),
        };

        if let Err(err) = state.router.dispatch(connection_id, event).await {
            debug!(%connection_id, error = %err, "inbound event rejected");
        }
    };

    if let Err(err) = state
        .router
        .dispatch(connection_id, Inbound::Disconnect { reason })
        .await
    {
        warn!(%connection_id, error = %err, "failed to clean up connection");
    }
    state.transport.detach(&connection_id);
    writer.abort();
}
