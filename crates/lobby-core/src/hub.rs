//! Lobby hub: the per-lobby event loop.
//!
//! Each lobby is served by one task that owns the member map. Callers talk to
//! it through a [`Hub`] handle, which pushes [`HubCommand`]s onto a bounded
//! queue. Because the loop handles one command at a time, register,
//! unregister and broadcast are totally ordered per lobby and the member map
//! needs no lock.
//!
//! ```text
//!  reader ──Broadcast──┐
//!  session ─Register───┼──▶ [command queue] ──▶ hub loop ──try_send──▶ member buffers
//!  session ─Unregister─┘                           ▲
//!  registry ────────────────── shutdown token ─────┘
//! ```

use crate::client::{Client, ClientId, Delivery, Outbound, DEFAULT_CLIENT_BUFFER};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A lobby identifier.
pub type LobbyId = String;

/// Default command queue capacity.
const DEFAULT_COMMAND_QUEUE: usize = 1024;

/// Validate a lobby ID.
///
/// Any non-empty string is accepted verbatim.
///
/// # Errors
///
/// Returns an error message if the ID is empty.
pub fn validate_lobby_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Lobby ID cannot be empty");
    }
    Ok(())
}

/// Hub errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub has been deleted or its loop has exited.
    #[error("Lobby hub closed: {0}")]
    Closed(LobbyId),
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the command queue feeding the loop.
    pub command_queue: usize,
    /// Outbound buffer capacity for each client.
    pub client_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_queue: DEFAULT_COMMAND_QUEUE,
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

/// Lifecycle of a hub loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    /// The loop is serving commands.
    Running,
    /// Shutdown was requested; the loop has not exited yet.
    Draining,
    /// The loop has exited.
    Terminated,
}

/// Operations serialized through the hub loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a member. `ack` fires once the member is in the map.
    Register {
        client: Client,
        ack: oneshot::Sender<()>,
    },
    /// Remove a member and close its buffer. No-op if absent.
    Unregister { id: ClientId },
    /// Fan a payload out to every member except `origin`.
    Broadcast {
        origin: Option<ClientId>,
        payload: Bytes,
    },
    /// Report the current member IDs.
    Members { reply: oneshot::Sender<Vec<ClientId>> },
}

/// Counters published by the loop for lock-free reads.
#[derive(Debug, Default)]
struct HubCounters {
    members: AtomicUsize,
    evictions: AtomicU64,
}

/// Handle to a running lobby hub.
///
/// Cloning is cheap; all clones address the same loop.
#[derive(Debug, Clone)]
pub struct Hub {
    id: LobbyId,
    commands: mpsc::Sender<HubCommand>,
    shutdown: CancellationToken,
    terminated: CancellationToken,
    counters: Arc<HubCounters>,
    config: HubConfig,
}

impl Hub {
    /// Spawn a hub loop for `id` on the current tokio runtime.
    #[must_use]
    pub fn spawn(id: impl Into<LobbyId>, config: HubConfig) -> Self {
        let id = id.into();
        let (commands, rx) = mpsc::channel(config.command_queue.max(1));
        let hub = Self {
            id: id.clone(),
            commands,
            shutdown: CancellationToken::new(),
            terminated: CancellationToken::new(),
            counters: Arc::new(HubCounters::default()),
            config,
        };

        let event_loop = HubLoop {
            id,
            members: HashMap::new(),
            commands: rx,
            shutdown: hub.shutdown.clone(),
            counters: Arc::clone(&hub.counters),
        };
        let terminated = hub.terminated.clone();
        tokio::spawn(async move {
            event_loop.run().await;
            terminated.cancel();
        });

        hub
    }

    /// Get the lobby ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create a client for this lobby with the configured buffer size.
    #[must_use]
    pub fn new_client(&self) -> (Client, Outbound) {
        Client::new(self.id.clone(), self.config.client_buffer)
    }

    /// Last member count published by the loop.
    ///
    /// May lag behind in-flight commands; use [`Hub::members`] for an exact
    /// answer.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.counters.members.load(Ordering::Acquire)
    }

    /// Number of members evicted for not keeping up.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.counters.evictions.load(Ordering::Relaxed)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HubState {
        if self.terminated.is_cancelled() {
            HubState::Terminated
        } else if self.shutdown.is_cancelled() {
            HubState::Draining
        } else {
            HubState::Running
        }
    }

    /// Check if this handle and `other` address the same loop.
    #[must_use]
    pub fn same_hub(&self, other: &Hub) -> bool {
        Arc::ptr_eq(&self.counters, &other.counters)
    }

    /// Register a client.
    ///
    /// Resolves once the loop has added the client, so every broadcast
    /// queued afterwards reaches it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has been shut down.
    pub async fn register(&self, client: Client) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(self.closed());
        }
        let (ack, done) = oneshot::channel();
        self.send(HubCommand::Register { client, ack }).await?;
        done.await.map_err(|_| self.closed())
    }

    /// Unregister a client. Unknown IDs are ignored by the loop.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has been shut down.
    pub async fn unregister(&self, id: &ClientId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { id: id.clone() }).await
    }

    /// Queue a payload for every member except `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has been shut down.
    pub async fn broadcast(
        &self,
        origin: Option<&ClientId>,
        payload: impl Into<Bytes>,
    ) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast {
            origin: origin.cloned(),
            payload: payload.into(),
        })
        .await
    }

    /// Ask the loop for its exact member list.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has been shut down.
    pub async fn members(&self) -> Result<Vec<ClientId>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Members { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Request shutdown. The loop exits before its next command.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(lobby = %self.id, "Closing hub");
            self.shutdown.cancel();
        }
    }

    /// Wait until the loop has exited.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await;
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        if self.shutdown.is_cancelled() {
            return Err(self.closed());
        }
        self.commands.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> HubError {
        HubError::Closed(self.id.clone())
    }
}

/// The loop side of a hub. Sole owner of the member map.
struct HubLoop {
    id: LobbyId,
    members: HashMap<ClientId, Client>,
    commands: mpsc::Receiver<HubCommand>,
    shutdown: CancellationToken,
    counters: Arc<HubCounters>,
}

impl HubLoop {
    async fn run(mut self) {
        debug!(lobby = %self.id, "Hub loop started");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    // Every handle dropped
                    None => break,
                },
            }
        }

        // Remaining members' buffers close here
        let remaining = self.members.len();
        self.members.clear();
        self.publish_count();
        debug!(lobby = %self.id, remaining, "Hub loop terminated");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { client, ack } => {
                let id = client.id().clone();
                if self.members.insert(id.clone(), client).is_some() {
                    warn!(lobby = %self.id, client = %id, "Replaced existing member");
                }
                self.publish_count();
                debug!(lobby = %self.id, client = %id, members = self.members.len(), "Registered");
                // The registering side may have given up waiting
                let _ = ack.send(());
            }
            HubCommand::Unregister { id } => {
                if self.members.remove(&id).is_some() {
                    self.publish_count();
                    debug!(lobby = %self.id, client = %id, members = self.members.len(), "Unregistered");
                }
            }
            HubCommand::Broadcast { origin, payload } => self.broadcast(origin.as_ref(), &payload),
            HubCommand::Members { reply } => {
                let _ = reply.send(self.members.keys().cloned().collect());
            }
        }
    }

    fn broadcast(&mut self, origin: Option<&ClientId>, payload: &Bytes) {
        let id = &self.id;
        let mut delivered = 0usize;
        let mut evicted = 0u64;

        self.members.retain(|client_id, client| {
            if origin == Some(client_id) {
                return true;
            }
            match client.offer(payload.clone()) {
                Delivery::Queued => {
                    delivered += 1;
                    true
                }
                Delivery::Full => {
                    warn!(lobby = %id, client = %client_id, "Evicting slow client");
                    evicted += 1;
                    false
                }
                Delivery::Closed => {
                    debug!(lobby = %id, client = %client_id, "Dropping client with closed buffer");
                    evicted += 1;
                    false
                }
            }
        });

        if evicted > 0 {
            self.counters.evictions.fetch_add(evicted, Ordering::Relaxed);
            self.publish_count();
        }
        trace!(lobby = %self.id, recipients = delivered, bytes = payload.len(), "Broadcast");
    }

    fn publish_count(&self) {
        self.counters
            .members
            .store(self.members.len(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_hub(client_buffer: usize) -> Hub {
        Hub::spawn(
            "test",
            HubConfig {
                command_queue: 64,
                client_buffer,
            },
        )
    }

    async fn join(hub: &Hub, name: &str) -> (ClientId, Outbound) {
        let (client, rx) = Client::with_id(name.into(), hub.id(), hub.config().client_buffer);
        let id = client.id().clone();
        hub.register(client).await.unwrap();
        (id, rx)
    }

    #[test]
    fn test_lobby_id_validation() {
        assert!(validate_lobby_id("room1").is_ok());
        assert!(validate_lobby_id("  spaces and $ymbols ").is_ok());
        assert!(validate_lobby_id("").is_err());
    }

    #[tokio::test]
    async fn test_register_unregister_counts() {
        let hub = small_hub(8);
        let (a, _rx_a) = join(&hub, "a").await;
        let (b, _rx_b) = join(&hub, "b").await;
        let (_c, _rx_c) = join(&hub, "c").await;
        assert_eq!(hub.member_count(), 3);

        hub.unregister(&a).await.unwrap();
        hub.unregister(&b).await.unwrap();
        // Double unregister is a no-op
        hub.unregister(&a).await.unwrap();
        hub.unregister(&"ghost".into()).await.unwrap();

        assert_eq!(hub.members().await.unwrap().len(), 1);
        assert_eq!(hub.member_count(), 1);
    }

    #[tokio::test]
    async fn test_unregister_closes_buffer() {
        let hub = small_hub(8);
        let (a, mut rx_a) = join(&hub, "a").await;

        hub.unregister(&a).await.unwrap();
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let hub = small_hub(8);
        let (_a, mut rx_a) = join(&hub, "a").await;
        let (_b, mut rx_b) = join(&hub, "b").await;
        let (_c, mut rx_c) = join(&hub, "c").await;

        hub.broadcast(None, b"hello".to_vec()).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_origin() {
        let hub = small_hub(8);
        let (a, mut rx_a) = join(&hub, "a").await;
        let (_b, mut rx_b) = join(&hub, "b").await;

        hub.broadcast(Some(&a), b"from a".to_vec()).await.unwrap();
        // Members round-trip orders after the broadcast
        hub.members().await.unwrap();

        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"from a"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_client_is_evicted() {
        let hub = small_hub(1);
        let (_fast, mut rx_fast) = join(&hub, "fast").await;
        let (slow, mut rx_slow) = join(&hub, "slow").await;

        hub.broadcast(None, b"one".to_vec()).await.unwrap();
        assert_eq!(rx_fast.recv().await.unwrap(), Bytes::from_static(b"one"));

        // "slow" still holds "one", so "two" overflows its buffer
        hub.broadcast(None, b"two".to_vec()).await.unwrap();

        let members = hub.members().await.unwrap();
        assert_eq!(members, vec![ClientId::from("fast")]);
        assert!(!members.contains(&slow));
        assert_eq!(hub.evictions(), 1);
        assert_eq!(hub.member_count(), 1);

        assert_eq!(rx_fast.recv().await.unwrap(), Bytes::from_static(b"two"));
        assert_eq!(rx_slow.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert!(rx_slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_no_broadcast_before_registration() {
        let hub = small_hub(8);
        let (_a, _rx_a) = join(&hub, "a").await;
        hub.broadcast(None, b"early".to_vec()).await.unwrap();

        let (_b, mut rx_b) = join(&hub, "b").await;
        hub.broadcast(None, b"late".to_vec()).await.unwrap();
        hub.members().await.unwrap();

        assert_eq!(rx_b.try_recv().unwrap(), Bytes::from_static(b"late"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_lifecycle() {
        let hub = small_hub(8);
        let (_a, mut rx_a) = join(&hub, "a").await;
        assert_eq!(hub.state(), HubState::Running);

        hub.close();
        assert_ne!(hub.state(), HubState::Running);
        hub.terminated().await;
        assert_eq!(hub.state(), HubState::Terminated);

        // Remaining members see their buffer close
        assert!(rx_a.recv().await.is_none());
        assert_eq!(hub.member_count(), 0);

        let (client, _rx) = hub.new_client();
        assert_eq!(
            hub.register(client).await,
            Err(HubError::Closed("test".to_string()))
        );
        assert!(hub.broadcast(None, b"late".to_vec()).await.is_err());
        assert!(hub.members().await.is_err());
    }

    #[tokio::test]
    async fn test_loop_exits_when_handles_dropped() {
        let hub = small_hub(8);
        let observer = hub.terminated.clone();
        drop(hub);
        observer.cancelled().await;
    }
}
