//! Transport seam between the client and the WebSocket library.
//!
//! The driver only sees [`Dialer`] and [`MessageStream`]; the production
//! implementation is [`WebSocketDialer`] over `tokio-tungstenite`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::trace;

use crate::error::TransportError;

/// Boxed future returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Kind of a data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

impl MessageType {
    /// Numeric tag using the WebSocket opcode values (1 = text, 2 = binary).
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Text => 1,
            Self::Binary => 2,
        }
    }
}

/// A data message received from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Frame kind.
    pub message_type: MessageType,
    /// Raw payload.
    pub payload: Bytes,
}

impl Message {
    /// Text message.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            message_type: MessageType::Text,
            payload: payload.into(),
        }
    }

    /// Binary message.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            message_type: MessageType::Binary,
            payload: payload.into(),
        }
    }
}

/// Opens connections to the event source.
pub trait Dialer: Send + Sync {
    /// Stream type produced by a successful dial.
    type Stream: MessageStream;

    /// Open a connection, failing if the handshake exceeds `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable or the handshake fails.
    fn dial<'a>(
        &'a self,
        endpoint: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Self::Stream, TransportError>>;
}

/// An established connection yielding data messages.
pub trait MessageStream: Send {
    /// Wait for the next data message.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport failure.
    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<Message>, TransportError>>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Dials WebSocket endpoints with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
    type Stream = WebSocketConnection;

    fn dial<'a>(
        &'a self,
        endpoint: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Self::Stream, TransportError>> {
        Box::pin(async move {
            let (ws, _response) =
                tokio::time::timeout(timeout, tokio_tungstenite::connect_async(endpoint))
                    .await
                    .map_err(|_| TransportError::HandshakeTimeout(timeout))??;
            Ok::<_, TransportError>(WebSocketConnection { ws })
        })
    }
}

/// A live WebSocket connection.
pub struct WebSocketConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection").finish_non_exhaustive()
    }
}

impl MessageStream for WebSocketConnection {
    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<Message>, TransportError>> {
        Box::pin(async move {
            loop {
                match self.ws.next().await {
                    Some(Ok(WsMessage::Text(text))) => return Ok(Some(Message::text(text))),
                    Some(Ok(WsMessage::Binary(data))) => return Ok(Some(Message::binary(data))),
                    Some(Ok(WsMessage::Close(frame))) => {
                        trace!(?frame, "received close frame");
                        return Ok(None);
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                    Some(Err(tungstenite::Error::ConnectionClosed)) | None => return Ok(None),
                    Some(Err(e)) => return Err(TransportError::from(e)),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            match self.ws.close(None).await {
                Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
                Err(e) => Err(TransportError::from(e)),
            }
        })
    }
}
