//! Per-connection client state.
//!
//! A [`Client`] is what a hub keeps for each member: an identity, the lobby
//! it belongs to, and the sending half of its bounded outbound buffer.
//! Dropping the `Client` closes the buffer, which is how the hub tells a
//! connection's writer to stop.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::LobbyId;

/// Default outbound buffer capacity, in messages.
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique client ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("client_{:x}_{}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Receiving half of a client's outbound buffer.
///
/// Yields `None` once the hub has dropped the client (unregistered, evicted,
/// or the hub terminated) and every buffered message has been drained.
pub type Outbound = mpsc::Receiver<Bytes>;

/// Outcome of offering a message to a client's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was queued.
    Queued,
    /// The buffer is full; the client is not keeping up.
    Full,
    /// The receiving side is gone.
    Closed,
}

/// A lobby member as seen by its hub.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    lobby: LobbyId,
    outbound: mpsc::Sender<Bytes>,
}

impl Client {
    /// Create a client for `lobby` with a generated ID.
    ///
    /// Returns the client and the receiving half of its outbound buffer.
    #[must_use]
    pub fn new(lobby: impl Into<LobbyId>, capacity: usize) -> (Self, Outbound) {
        Self::with_id(ClientId::generate(), lobby, capacity)
    }

    /// Create a client with an explicit ID.
    #[must_use]
    pub fn with_id(id: ClientId, lobby: impl Into<LobbyId>, capacity: usize) -> (Self, Outbound) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let client = Self {
            id,
            lobby: lobby.into(),
            outbound,
        };
        (client, rx)
    }

    /// Get the client ID.
    #[must_use]
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Get the ID of the lobby this client belongs to.
    #[must_use]
    pub fn lobby(&self) -> &str {
        &self.lobby
    }

    /// Offer a message without waiting for buffer space.
    pub fn offer(&self, payload: Bytes) -> Delivery {
        match self.outbound.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
