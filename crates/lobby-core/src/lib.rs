//! # lobby-core
//!
//! Lobby hubs, clients, and the lobby registry.
//!
//! This crate provides the building blocks of the lobby server:
//!
//! - **Client** - Per-connection identity and bounded outbound buffer
//! - **Hub** - Single-task event loop owning one lobby's members
//! - **Registry** - Concurrent map from lobby ID to hub
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│     Hub     │────▶│   Clients   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲
//!                            │
//!                     ┌─────────────┐
//!                     │  Registry   │
//!                     └─────────────┘
//! ```

pub mod client;
pub mod hub;
pub mod registry;

pub use client::{Client, ClientId, Delivery, Outbound};
pub use hub::{Hub, HubCommand, HubConfig, HubError, HubState, LobbyId};
pub use registry::{LobbyInfo, LobbyRegistry, RegistryConfig, RegistryError, RegistryStats};
