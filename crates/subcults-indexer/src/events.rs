//! Client lifecycle events.

use std::fmt;
use std::time::Duration;

/// Why a streaming session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the stream.
    PeerClosed,
    /// Reading from the stream failed.
    Transport(String),
    /// The message handler returned an error.
    Handler(String),
    /// The connection was closed locally through the lifecycle manager.
    ClosedLocally,
    /// The cancellation token fired.
    Cancelled,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => f.write_str("peer closed connection"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Handler(e) => write!(f, "handler error: {e}"),
            Self::ClosedLocally => f.write_str("closed locally"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Events broadcast by the ingestion client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Dial succeeded; streaming started.
    Connected {
        /// Identifier of the new connection.
        connection_id: u64,
    },
    /// Streaming ended; the driver will redial.
    Disconnected {
        /// Why the stream ended.
        reason: DisconnectReason,
    },
    /// Dial failed; waiting before the next attempt.
    Reconnecting {
        /// Consecutive dial failures so far.
        attempt: u32,
        /// Delay before the next dial.
        delay: Duration,
    },
    /// The client was cancelled and `run` is returning.
    Stopped,
}
