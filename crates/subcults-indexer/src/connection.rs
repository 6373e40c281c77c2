//! Connection lifecycle management.
//!
//! [`ConnectionSlot`] keeps the installed [`ConnectionHandle`] and the
//! `connected` flag behind one lock so observers on other threads always see
//! both change together. [`ConnectionManager`] dials through a [`Dialer`] and
//! installs the handle on success.
//!
//! The socket itself is owned by the [`Session`] that the read loop drives;
//! the handle carries a token that tells the session to close it. This keeps
//! all socket I/O on the single driver task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::transport::{Dialer, MessageStream};

/// Reference to the live connection held in the slot.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    endpoint: String,
    established_at: Instant,
    closer: CancellationToken,
}

impl ConnectionHandle {
    fn close(self) {
        self.closer.cancel();
    }
}

/// Point-in-time view of the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether a connection is installed.
    pub connected: bool,
    /// Identifier of the installed connection.
    pub connection_id: Option<u64>,
    /// Endpoint of the installed connection.
    pub endpoint: Option<String>,
    /// How long the installed connection has been up.
    pub uptime: Option<Duration>,
}

#[derive(Debug, Default)]
struct SlotInner {
    handle: Option<ConnectionHandle>,
    connected: bool,
}

/// Lock-guarded `(handle, connected)` unit.
#[derive(Debug, Default)]
pub struct ConnectionSlot {
    inner: Mutex<SlotInner>,
}

impl ConnectionSlot {
    /// Create an empty, disconnected slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` and mark the slot connected.
    ///
    /// Any previously installed handle is closed first.
    fn install(&self, handle: ConnectionHandle) {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.handle.replace(handle) {
            previous.close();
        }
        inner.connected = true;
    }

    /// Close the installed handle, if any, and mark the slot disconnected.
    ///
    /// Returns `true` if a handle was installed. Calling this on an empty
    /// slot is a no-op.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        let closed = match inner.handle.take() {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        };
        inner.connected = false;
        closed
    }

    /// Whether a connection is installed right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Snapshot of the slot taken under the lock.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let inner = self.inner.lock();
        let handle = inner.handle.as_ref();
        ConnectionStatus {
            connected: inner.connected,
            connection_id: handle.map(|h| h.id),
            endpoint: handle.map(|h| h.endpoint.clone()),
            uptime: handle.map(|h| h.established_at.elapsed()),
        }
    }
}

/// An established connection handed to the read loop.
#[derive(Debug)]
pub struct Session<S> {
    /// Identifier matching the installed handle.
    pub id: u64,
    /// The message stream.
    pub stream: S,
    closed: CancellationToken,
}

impl<S: MessageStream> Session<S> {
    /// Token cancelled when the slot closes this connection.
    #[must_use]
    pub const fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Close the underlying stream. Errors are logged and swallowed.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.close().await {
            debug!(connection_id = self.id, error = %e, "error while closing connection");
        }
    }
}

/// Dials connections and owns the slot they are installed in.
#[derive(Debug)]
pub struct ConnectionManager<D> {
    dialer: D,
    slot: ConnectionSlot,
    next_id: AtomicU64,
}

impl<D: Dialer> ConnectionManager<D> {
    /// Create a manager around `dialer`.
    #[must_use]
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            slot: ConnectionSlot::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Dial `endpoint` and install the connection.
    ///
    /// # Errors
    ///
    /// Returns the dial error unchanged; nothing is installed on failure.
    pub async fn connect(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Session<D::Stream>, TransportError> {
        info!(endpoint, "connecting to jetstream");

        let stream = self.dialer.dial(endpoint, timeout).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let closed = CancellationToken::new();
        self.slot.install(ConnectionHandle {
            id,
            endpoint: endpoint.to_string(),
            established_at: Instant::now(),
            closer: closed.clone(),
        });

        info!(connection_id = id, "connected to jetstream");
        Ok(Session { id, stream, closed })
    }

    /// Close the installed connection, if any.
    pub fn close(&self) -> bool {
        self.slot.close()
    }

    /// Whether a connection is installed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    /// Snapshot of the installed connection.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.slot.status()
    }

    /// The underlying slot.
    #[must_use]
    pub const fn slot(&self) -> &ConnectionSlot {
        &self.slot
    }

    /// The dialer.
    #[must_use]
    pub const fn dialer(&self) -> &D {
        &self.dialer
    }
}
