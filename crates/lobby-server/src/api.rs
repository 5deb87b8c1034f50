//! Lobby REST API handlers.

use crate::handlers::AppState;
use crate::metrics;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use lobby_core::{LobbyInfo, RegistryError};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown lobby.
    #[error("Lobby not found: {0}")]
    NotFound(String),

    /// A server limit was reached.
    #[error("{0}")]
    Unavailable(String),

    /// The endpoint only accepts WebSocket upgrades.
    #[error("WebSocket upgrade required")]
    UpgradeRequired,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidLobbyId(_) => Self::BadRequest(e.to_string()),
            RegistryError::LobbyLimitReached(_) => Self::Unavailable(e.to_string()),
        }
    }
}

/// Body of `POST /create_lobby`.
#[derive(Debug, Deserialize)]
pub struct CreateLobbyRequest {
    pub lobby_id: String,
}

/// Query string carrying a lobby ID.
#[derive(Debug, Deserialize)]
pub struct LobbyQuery {
    pub lobby_id: Option<String>,
}

impl LobbyQuery {
    /// The lobby ID, if present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] when the parameter is missing or empty.
    pub fn require(self) -> Result<String, ApiError> {
        match self.lobby_id {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ApiError::BadRequest("Lobby ID is required".to_string())),
        }
    }
}

/// POST /create_lobby - Create a lobby, or return the existing one.
///
/// The body is decoded by hand so that an empty or non-JSON body is a 400
/// regardless of the content type header.
pub async fn create_lobby(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: CreateLobbyRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let hub = state.registry.create_or_get(&request.lobby_id)?;
    metrics::set_registry_stats(state.registry.stats());
    debug!(lobby = %hub.id(), "Create lobby request");

    Ok((
        StatusCode::CREATED,
        format!("Lobby created with ID: {}", hub.id()),
    ))
}

/// GET /get_lobby?lobby_id=... - Lobby info.
pub async fn get_lobby(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LobbyQuery>,
) -> Result<Json<LobbyInfo>, ApiError> {
    let id = query.require()?;
    state
        .registry
        .info(&id)
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

/// DELETE /delete_lobby?lobby_id=... - Delete a lobby. Unknown IDs succeed.
pub async fn delete_lobby(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LobbyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = query.require()?;
    let removed = state.registry.delete(&id);
    metrics::set_registry_stats(state.registry.stats());
    debug!(lobby = %id, removed, "Delete lobby request");

    Ok(format!("Lobby with ID {} deleted", id))
}

/// GET /list_lobbies - Every lobby with its client count.
pub async fn list_lobbies(State(state): State<Arc<AppState>>) -> Json<Vec<LobbyInfo>> {
    Json(state.registry.list())
}
