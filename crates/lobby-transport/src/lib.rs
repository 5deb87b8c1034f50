//! # lobby-transport
//!
//! Connection adapters for the lobby server.
//!
//! - **WebSocket** - An upgraded axum WebSocket
//! - **Memory** - An in-process duplex pair, for tests and embedding
//!
//! ## Connection Abstraction
//!
//! Every adapter implements [`Connection`], which splits into a reader and a
//! writer so that receiving and sending can run on separate tasks.
//!
//! ```rust,ignore
//! use lobby_transport::Connection;
//!
//! async fn echo(conn: Box<dyn Connection>) {
//!     let (mut reader, mut writer) = conn.split();
//!     while let Ok(Some(data)) = reader.recv().await {
//!         if writer.send(data).await.is_err() {
//!             break;
//!         }
//!     }
//!     let _ = writer.close().await;
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, ConnectionReader, ConnectionWriter, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
