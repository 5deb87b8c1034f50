//! WebSocket connection adapter.
//!
//! Wraps an upgraded axum [`WebSocket`]. Text and binary frames are both
//! delivered as raw bytes; outbound payloads go out as text frames when they
//! are valid UTF-8 and as binary frames otherwise.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionReader, ConnectionWriter, TransportError};

/// An upgraded WebSocket connection.
pub struct WebSocketConnection {
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
}

impl WebSocketConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            socket,
            remote_addr,
        }
    }
}

impl Connection for WebSocketConnection {
    fn transport(&self) -> &'static str {
        "websocket"
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Box<dyn ConnectionWriter>) {
        let (sink, stream) = self.socket.split();
        (
            Box::new(WebSocketReader { stream }),
            Box::new(WebSocketWriter { sink, closed: false }),
        )
    }
}

/// Receiving half of a [`WebSocketConnection`].
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl ConnectionReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Bytes::from(data))),
                Some(Ok(Message::Text(text))) => return Ok(Some(Bytes::from(text))),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Pongs are queued by the protocol layer
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

/// Sending half of a [`WebSocketConnection`].
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl ConnectionWriter for WebSocketWriter {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.sink
            .send(outbound_message(data))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }
}

/// Choose the frame type for an outbound payload.
fn outbound_message(data: Bytes) -> Message {
    match String::from_utf8(data.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_payload_goes_out_as_text() {
        match outbound_message(Bytes::from_static(b"hello")) {
            Message::Text(text) => assert_eq!(text, "hello"),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_payload_goes_out_as_binary() {
        match outbound_message(Bytes::from_static(&[0xff, 0x00, 0xfe])) {
            Message::Binary(data) => assert_eq!(data, vec![0xff, 0x00, 0xfe]),
            other => panic!("expected binary frame, got {:?}", other),
        }
    }
}
