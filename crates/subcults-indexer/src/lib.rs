//! Subcults Jetstream indexer client.
//!
//! A long-lived WebSocket consumer for the AT Protocol Jetstream firehose.
//! [`IndexerClient`] keeps a single connection alive across network failures:
//! failed dials are retried with capped, jittered exponential backoff, dropped
//! streams are redialed immediately, and every message is handed to a
//! caller-supplied [`MessageHandler`]. It only stops when its cancellation
//! token fires.
//!
//! ```no_run
//! use subcults_indexer::{ClientConfig, EventCounter, IndexerClient};
//! use tokio_util::sync::CancellationToken;
//! use tracing::Dispatch;
//!
//! # async fn example() -> Result<(), subcults_indexer::IndexerError> {
//! let config = ClientConfig::default().with_collections(["app.subcults.scene"]);
//! let client = IndexerClient::new(config, EventCounter::new(), Dispatch::none())?;
//!
//! let cancel = CancellationToken::new();
//! let result = client.run(cancel).await;
//! assert!(result.is_err_and(|e| e.is_cancelled()));
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod handler;
pub mod read_loop;
pub mod state;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backoff::{compute_backoff, BackoffPolicy};
pub use client::IndexerClient;
pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionSlot, ConnectionStatus};
pub use error::{IndexerError, TransportError};
pub use events::{ClientEvent, DisconnectReason};
pub use handler::{HandlerError, MessageHandler};
pub use state::{AtomicDriverState, DriverState};
pub use stats::{CounterSnapshot, EventCounter};
pub use transport::{Dialer, Message, MessageStream, MessageType, WebSocketDialer};
