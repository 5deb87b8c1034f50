//! In-memory connection.
//!
//! [`MemoryConnection::pair`] returns a connection for the server side and a
//! [`MemoryPeer`] that plays the remote client. Useful for tests and for
//! embedding lobbies in-process without a network.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionReader, ConnectionWriter, TransportError};

type Inbound = Result<Bytes, String>;

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Remote side of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryConnection {
    /// Create a connected pair.
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: in_rx,
                outbound: out_tx,
            },
            MemoryPeer {
                inbound: Some(in_tx),
                outbound: out_rx,
            },
        )
    }
}

impl Connection for MemoryConnection {
    fn transport(&self) -> &'static str {
        "memory"
    }

    fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Box<dyn ConnectionWriter>) {
        (
            Box::new(MemoryReader {
                inbound: self.inbound,
            }),
            Box::new(MemoryWriter {
                outbound: Some(self.outbound),
            }),
        )
    }
}

struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl ConnectionReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(data)) => Ok(Some(data)),
            Some(Err(reason)) => Err(TransportError::ReceiveFailed(reason)),
            None => Ok(None),
        }
    }
}

struct MemoryWriter {
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
}

#[async_trait]
impl ConnectionWriter for MemoryWriter {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        outbound
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

impl MemoryPeer {
    /// Send a message to the server side.
    ///
    /// # Errors
    ///
    /// Returns an error if this peer was closed or the server side is gone.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), TransportError> {
        let inbound = self
            .inbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        inbound
            .send(Ok(data.into()))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Make the server side's next receive fail.
    ///
    /// # Errors
    ///
    /// Returns an error if this peer was closed or the server side is gone.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), TransportError> {
        let inbound = self
            .inbound
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        inbound
            .send(Err(reason.into()))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Receive the next message from the server side.
    ///
    /// Returns `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Close the client side; the server's reader sees a clean close.
    pub fn close(&mut self) {
        self.inbound = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let (conn, mut peer) = MemoryConnection::pair();
        let (mut reader, mut writer) = Box::new(conn).split();

        peer.send(&b"ping"[..]).unwrap();
        assert_eq!(reader.recv().await.unwrap().unwrap(), Bytes::from_static(b"ping"));

        writer.send(Bytes::from_static(b"pong")).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn test_memory_close_both_ways() {
        let (conn, mut peer) = MemoryConnection::pair();
        let (mut reader, mut writer) = Box::new(conn).split();

        peer.close();
        assert!(reader.recv().await.unwrap().is_none());
        assert!(peer.send(&b"late"[..]).is_err());

        writer.close().await.unwrap();
        writer.close().await.unwrap();
        assert!(peer.recv().await.is_none());
        assert!(matches!(
            writer.send(Bytes::from_static(b"late")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_memory_receive_error() {
        let (conn, peer) = MemoryConnection::pair();
        let (mut reader, _writer) = Box::new(conn).split();

        peer.fail("protocol violation").unwrap();
        assert!(matches!(
            reader.recv().await,
            Err(TransportError::ReceiveFailed(reason)) if reason == "protocol violation"
        ));
    }
}
