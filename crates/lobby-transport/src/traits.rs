//! Connection abstraction traits.
//!
//! A connection is a duplex message stream. The session layer reads and
//! writes concurrently, so a connection is split into a receiving half and a
//! sending half that can live on different tasks.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Receiving half of a connection.
#[async_trait]
pub trait ConnectionReader: Send {
    /// Receive the next message.
    ///
    /// Returns `None` if the peer closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Sending half of a connection.
#[async_trait]
pub trait ConnectionWriter: Send {
    /// Send a message.
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError>;

    /// Close the connection gracefully. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An established duplex connection.
pub trait Connection: Send {
    /// Get the transport name (e.g., "websocket", "memory").
    fn transport(&self) -> &'static str;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Split into independently owned halves.
    fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Box<dyn ConnectionWriter>);
}
