//! Error types for the indexer client.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the indexer client.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Configuration rejected at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// `run` was called while another `run` on the same client is active.
    #[error("client is already running")]
    AlreadyRunning,

    /// The client stopped because its cancellation token fired.
    #[error("client cancelled")]
    Cancelled,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexerError {
    /// Whether this is the designed termination path rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Transport-level failures: dialing or reading from the stream.
///
/// All of these are recoverable from the client's point of view.
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol or socket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The opening handshake did not finish in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Any other connection failure.
    #[error("connection error: {0}")]
    Connect(String),
}
