//! HTTP routing and the WebSocket upgrade endpoint.

use crate::api::{self, ApiError, LobbyQuery};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::session;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use lobby_core::LobbyRegistry;
use lobby_transport::WebSocketConnection;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The lobby registry.
    pub registry: LobbyRegistry,
    /// Server configuration.
    pub config: Config,
    /// Connections admitted and not yet finished, upgrades in progress
    /// included.
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            registry: LobbyRegistry::with_config(config.registry()),
            config,
            connections: AtomicUsize::new(0),
        }
    }

    /// Number of admitted connections.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Reserve a connection slot, or `None` at `limits.max_connections`.
    pub fn try_admit(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.limits.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionSlot(Arc::clone(self)))
    }
}

/// A reserved connection slot, released on drop.
pub struct ConnectionSlot(Arc<AppState>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route("/create_lobby", post(api::create_lobby))
        .route("/get_lobby", get(api::get_lobby))
        .route("/delete_lobby", delete(api::delete_lobby))
        .route("/list_lobbies", get(api::list_lobbies))
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let router = app(Arc::clone(&state));

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Lobby server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}?lobby_id=<id>",
        addr, config.transport.websocket_path
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
    state.registry.shutdown();
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
///
/// The lobby must already exist; joining never creates one. A connection
/// slot is held from here until the session ends.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LobbyQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ws: Option<WebSocketUpgrade>,
) -> Result<impl IntoResponse, ApiError> {
    let id = query.require()?;
    let hub = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(id.clone()))?;

    let slot = state.try_admit().ok_or_else(|| {
        ApiError::Unavailable(format!(
            "Maximum connections reached ({})",
            state.config.limits.max_connections
        ))
    })?;

    let ws = ws.ok_or(ApiError::UpgradeRequired)?;
    let remote = connect_info.map(|ConnectInfo(addr)| addr);
    debug!(lobby = %id, remote = ?remote, "WebSocket upgrade");

    Ok(ws
        .max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let _metrics_guard = ConnectionMetricsGuard::new();
            let conn = WebSocketConnection::new(socket, remote);
            let registry = &state.registry;
            session::run_session(Box::new(conn), hub, || {
                metrics::set_registry_stats(registry.stats());
            })
            .await;
            metrics::set_registry_stats(registry.stats());
        }))
}
