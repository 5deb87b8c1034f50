//! Lobby registry.
//!
//! The registry maps lobby IDs to running hubs. It creates hubs lazily,
//! spawns their loops, and shuts them down on delete.

use crate::hub::{validate_lobby_id, Hub, HubConfig, LobbyId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Invalid lobby ID.
    #[error("Invalid lobby ID: {0}")]
    InvalidLobbyId(&'static str),

    /// Maximum lobbies reached.
    #[error("Maximum lobbies reached ({0})")]
    LobbyLimitReached(usize),
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of live lobbies.
    pub max_lobbies: usize,
    /// Configuration for every hub the registry spawns.
    pub hub: HubConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_lobbies: 10_000,
            hub: HubConfig::default(),
        }
    }
}

/// Read-only projection of a lobby for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyInfo {
    /// Lobby ID.
    pub id: LobbyId,
    /// Last known number of connected clients.
    pub clients: usize,
}

impl LobbyInfo {
    fn of(hub: &Hub) -> Self {
        Self {
            id: hub.id().to_string(),
            clients: hub.member_count(),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of live lobbies.
    pub lobby_count: usize,
    /// Clients across all lobbies.
    pub client_count: usize,
}

/// Map from lobby ID to hub.
pub struct LobbyRegistry {
    lobbies: DashMap<LobbyId, Hub>,
    config: RegistryConfig,
}

impl LobbyRegistry {
    /// Create an empty registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating lobby registry with config: {:?}", config);
        Self {
            lobbies: DashMap::new(),
            config,
        }
    }

    /// Get the hub for `id`, creating and starting one if none exists.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is empty or the lobby limit is reached.
    pub fn create_or_get(&self, id: &str) -> Result<Hub, RegistryError> {
        validate_lobby_id(id).map_err(RegistryError::InvalidLobbyId)?;

        // Fast path under the shard read lock
        if let Some(hub) = self.lobbies.get(id) {
            return Ok(hub.clone());
        }

        // Approximate under concurrent inserts; len() must not run while an
        // entry guard is held
        let at_limit = self.lobbies.len() >= self.config.max_lobbies;

        // The entry holds the shard write lock across check-and-insert
        match self.lobbies.entry(id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(_) if at_limit => {
                Err(RegistryError::LobbyLimitReached(self.config.max_lobbies))
            }
            Entry::Vacant(entry) => {
                debug!(lobby = %id, "Creating new lobby");
                let hub = Hub::spawn(id, self.config.hub.clone());
                entry.insert(hub.clone());
                Ok(hub)
            }
        }
    }

    /// Look up the hub for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Hub> {
        self.lobbies.get(id).map(|hub| hub.clone())
    }

    /// Remove the hub for `id` and shut its loop down.
    ///
    /// Returns `true` if a lobby was removed.
    pub fn delete(&self, id: &str) -> bool {
        match self.lobbies.remove(id) {
            Some((_, hub)) => {
                hub.close();
                debug!(lobby = %id, "Deleted lobby");
                true
            }
            None => false,
        }
    }

    /// Snapshot of every lobby, sorted by ID.
    #[must_use]
    pub fn list(&self) -> Vec<LobbyInfo> {
        let mut lobbies: Vec<LobbyInfo> = self
            .lobbies
            .iter()
            .map(|entry| LobbyInfo::of(entry.value()))
            .collect();
        lobbies.sort_by(|a, b| a.id.cmp(&b.id));
        lobbies
    }

    /// Info for a single lobby.
    #[must_use]
    pub fn info(&self, id: &str) -> Option<LobbyInfo> {
        self.lobbies.get(id).map(|hub| LobbyInfo::of(hub.value()))
    }

    /// Check if a lobby exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.lobbies.contains_key(id)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            lobby_count: self.lobbies.len(),
            client_count: self.lobbies.iter().map(|e| e.value().member_count()).sum(),
        }
    }

    /// Get the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Delete every lobby.
    pub fn shutdown(&self) {
        let ids: Vec<LobbyId> = self.lobbies.iter().map(|e| e.key().clone()).collect();
        let count = ids.len();
        for id in ids {
            self.delete(&id);
        }
        info!(lobbies = count, "Lobby registry shut down");
    }
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
