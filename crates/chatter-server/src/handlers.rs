//! Connection handlers for the Chatter server.
//!
//! This module handles the HTTP surface, the handshake and the per-connection
//! session loop.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chatter_core::{
    AuthenticationError, Gatekeeper, Hub, HubError, IdentityClaim, InMemoryMessageStore,
    InMemoryUserDirectory, JwtVerifier, UserDirectory,
};
use chatter_protocol::EventKind;
use chatter_transport::{handshake_from_request, Connection, WsConnection};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Presence, broadcast and dispatch.
    pub hub: Hub,
    /// Handshake token verification.
    pub gatekeeper: Gatekeeper,
    /// Profiles used to enrich relayed messages.
    pub directory: Arc<InMemoryUserDirectory>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state backed by the in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(InMemoryUserDirectory::new());
        let store = Arc::new(InMemoryMessageStore::with_history_limit(
            Arc::clone(&directory) as Arc<dyn UserDirectory>,
            config.chat.history_limit,
        ));
        let verifier = JwtVerifier::with_leeway(
            config.auth.jwt_secret.as_bytes(),
            config.auth.leeway_secs,
        );

        Self {
            hub: Hub::with_config(store, config.hub_config()),
            gatekeeper: Gatekeeper::new(Arc::new(verifier)),
            directory,
            config,
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let websocket_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route(&websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Chatter server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let state = Arc::new(AppState::new(config));
    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "online": state.hub.online(),
    }))
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Token for clients that cannot set headers.
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The token is verified before the upgrade; refused clients never reach
/// the hub.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.hub.online() >= state.config.limits.max_connections {
        warn!(remote = %addr, "Connection limit reached");
        metrics::record_rejection("capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is full").into_response();
    }

    let handshake = handshake_from_request(&headers, query.token.as_deref());
    let identity = match state.gatekeeper.admit(&handshake) {
        Ok(identity) => identity,
        Err(e) => {
            debug!(remote = %addr, error = %e, "Handshake refused");
            metrics::record_rejection(rejection_reason(&e));
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    state.directory.remember(&identity);

    let max_message_size = state.config.transport.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            let connection = WsConnection::new(socket, max_message_size).with_remote_addr(addr);
            run_connection(connection, identity, state)
        })
        .into_response()
}

fn rejection_reason(error: &AuthenticationError) -> &'static str {
    match error {
        AuthenticationError::MissingToken => "missing_token",
        AuthenticationError::Expired => "expired",
        _ => "invalid_token",
    }
}

/// Drive one admitted connection until either side closes.
///
/// Joins the hub, then forwards hub events to the peer and peer events to
/// the hub. The session always leaves the hub on exit.
pub async fn run_connection<C: Connection>(
    mut connection: C,
    identity: IdentityClaim,
    state: Arc<AppState>,
) {
    let hub = &state.hub;
    let mut session = hub.open(identity);

    if let Err(e) = hub.join(&mut session).await {
        error!(connection = %session.id(), error = %e, "Failed to join");
        if let Err(e) = connection.close().await {
            debug!(error = %e, "Close after failed join");
        }
        return;
    }

    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!(
        connection = %session.id(),
        remote = connection.remote_addr().as_deref().unwrap_or("unknown"),
        "Session started"
    );

    loop {
        tokio::select! {
            biased;

            outbound = session.recv() => {
                let Some(event) = outbound else {
                    break;
                };
                if let Err(e) = connection.send(&event).await {
                    debug!(connection = %session.id(), error = %e, "Send failed");
                    break;
                }
                metrics::record_event(event.kind(), "outbound");
            }

            inbound = connection.recv() => {
                match inbound {
                    Ok(Some(event)) => {
                        let start = Instant::now();
                        let kind = event.kind();
                        metrics::record_event(kind, "inbound");

                        match hub.dispatch(&session, event).await {
                            Ok(report) => {
                                if kind == EventKind::SendMessage {
                                    metrics::record_relayed();
                                }
                                metrics::record_dropped(report.dropped);
                            }
                            Err(HubError::Relay(e)) => metrics::record_relay_failure(&e),
                            Err(e) => {
                                warn!(connection = %session.id(), error = %e, "Dispatch failed");
                                break;
                            }
                        }

                        metrics::record_latency(start.elapsed().as_secs_f64());
                    }
                    Ok(None) => break,
                    Err(e) if !e.is_fatal() => {
                        debug!(
                            connection = %session.id(),
                            error = %e,
                            "Skipping undecodable frame"
                        );
                        metrics::record_error("decode");
                    }
                    Err(e) => {
                        warn!(connection = %session.id(), error = %e, "Connection error");
                        metrics::record_error("transport");
                        break;
                    }
                }
            }
        }
    }

    hub.leave(&mut session).await;
    if let Err(e) = connection.close().await {
        debug!(error = %e, "Close failed");
    }
}
