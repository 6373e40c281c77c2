//! Jetstream client with automatic reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{info, info_span, warn, Dispatch, Instrument};

use crate::backoff::BackoffPolicy;
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionSlot, ConnectionStatus};
use crate::error::IndexerError;
use crate::events::{ClientEvent, DisconnectReason};
use crate::handler::MessageHandler;
use crate::read_loop::run_read_loop;
use crate::state::{AtomicDriverState, DriverState};
use crate::transport::{Dialer, WebSocketDialer};

const EVENT_CAPACITY: usize = 64;

/// A resilient Jetstream client.
///
/// [`run`](Self::run) dials the endpoint, streams messages into the handler
/// and redials forever: after a failed dial it waits an exponentially
/// growing, jittered delay; after a stream ends it redials immediately (or
/// after the configured reconnect floor). It only returns once cancelled.
pub struct IndexerClient<H, D = WebSocketDialer> {
    config: ClientConfig,
    url: String,
    backoff: BackoffPolicy,
    handler: H,
    manager: ConnectionManager<D>,
    dispatch: Dispatch,
    state: AtomicDriverState,
    running: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
}

impl<H: MessageHandler> IndexerClient<H, WebSocketDialer> {
    /// Create a client that dials over WebSocket.
    ///
    /// All logging goes to `dispatch`; pass [`Dispatch::none`] to disable it.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Config`] if the configuration is invalid.
    pub fn new(config: ClientConfig, handler: H, dispatch: Dispatch) -> Result<Self, IndexerError> {
        Self::with_dialer(config, handler, WebSocketDialer, dispatch)
    }
}

impl<H: MessageHandler, D: Dialer> IndexerClient<H, D> {
    /// Create a client using a custom dialer.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Config`] if the configuration is invalid.
    pub fn with_dialer(
        config: ClientConfig,
        handler: H,
        dialer: D,
        dispatch: Dispatch,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let url = config.subscribe_url()?.to_string();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            backoff: BackoffPolicy::from_config(&config),
            config,
            url,
            handler,
            manager: ConnectionManager::new(dialer),
            dispatch,
            state: AtomicDriverState::new(DriverState::Idle),
            running: AtomicBool::new(false),
            events,
        })
    }

    /// Whether a connection is currently established.
    ///
    /// Safe to call from any thread while [`run`](Self::run) is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Snapshot of the current connection.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Current driver state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state.load()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Drop the current connection; the driver redials right away.
    ///
    /// Returns `true` if a connection was open.
    pub fn disconnect(&self) -> bool {
        self.manager.close()
    }

    /// The configuration the client was built with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The URL actually dialed, including collection filters.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The message handler.
    #[must_use]
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// The dialer.
    #[must_use]
    pub const fn dialer(&self) -> &D {
        self.manager.dialer()
    }

    /// Run until `cancel` fires, reconnecting as needed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Cancelled`] once cancelled, or
    /// [`IndexerError::AlreadyRunning`] if another `run` is active.
    ///
    /// Dropping the returned future also releases the connection and lets
    /// the client be run again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), IndexerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(IndexerError::AlreadyRunning);
        }
        let _guard = RunGuard {
            running: &self.running,
            slot: self.manager.slot(),
            state: &self.state,
        };

        self.drive(&cancel)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<(), IndexerError> {
        let span = info_span!("jetstream", endpoint = %self.config.endpoint);
        self.connection_loop(cancel).instrument(span).await
    }

    async fn connection_loop(&self, cancel: &CancellationToken) -> Result<(), IndexerError> {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.stop());
            }

            self.state.store(DriverState::Connecting);
            let dialed = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.stop()),
                dialed = self.manager.connect(&self.url, self.config.handshake_timeout()) => dialed,
            };

            let mut session = match dialed {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt = attempt.saturating_add(1),
                        "jetstream connection failed"
                    );

                    let delay = self.backoff.delay(attempt);
                    attempt = attempt.saturating_add(1);

                    info!(
                        delay_ms = delay.as_millis() as u64,
                        attempt, "scheduling reconnect"
                    );
                    self.state.store(DriverState::Backoff);
                    self.emit(ClientEvent::Reconnecting { attempt, delay });

                    if !self.pause(delay, cancel).await {
                        return Err(self.stop());
                    }
                    continue;
                }
            };

            attempt = 0;
            self.state.store(DriverState::Streaming);
            self.emit(ClientEvent::Connected {
                connection_id: session.id,
            });

            let reason = run_read_loop(
                &mut session,
                &self.handler,
                self.manager.slot(),
                cancel,
                self.config.handshake_timeout(),
            )
            .await;
            drop(session);

            if reason == DisconnectReason::Cancelled {
                return Err(self.stop());
            }
            self.emit(ClientEvent::Disconnected { reason });

            let floor = self.config.reconnect_floor();
            if !floor.is_zero() && !self.pause(floor, cancel).await {
                return Err(self.stop());
            }
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` if cancelled.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn stop(&self) -> IndexerError {
        info!("jetstream client stopping due to cancellation");
        self.manager.close();
        self.state.store(DriverState::Stopped);
        self.emit(ClientEvent::Stopped);
        IndexerError::Cancelled
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Clears the slot and the running flag when `run` exits, including when its
/// future is dropped before completing.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    slot: &'a ConnectionSlot,
    state: &'a AtomicDriverState,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.slot.close();
        self.state.store(DriverState::Stopped);
        self.running.store(false, Ordering::SeqCst);
    }
}

impl<H, D> std::fmt::Debug for IndexerClient<H, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerClient")
            .field("url", &self.url)
            .field("state", &self.state.load())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
