//! Reconnection driver state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of the reconnection driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// `run` has not been called yet.
    Idle,
    /// Dialing the endpoint.
    Connecting,
    /// Connected; the read loop is dispatching messages.
    Streaming,
    /// Waiting out a backoff delay after a failed dial.
    Backoff,
    /// Cancelled; `run` has returned.
    Stopped,
}

impl DriverState {
    /// Lowercase name, used in logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic wrapper for the driver state.
#[derive(Debug)]
pub struct AtomicDriverState(AtomicU8);

impl AtomicDriverState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: DriverState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> DriverState {
        match self.0.load(Ordering::SeqCst) {
            0 => DriverState::Idle,
            1 => DriverState::Connecting,
            2 => DriverState::Streaming,
            3 => DriverState::Backoff,
            _ => DriverState::Stopped,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: DriverState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

impl Default for AtomicDriverState {
    fn default() -> Self {
        Self::new(DriverState::Idle)
    }
}
