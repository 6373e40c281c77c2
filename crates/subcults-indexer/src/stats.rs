//! Counting handler for Jetstream events.
//!
//! Jetstream frames are JSON objects carrying a `kind` of `commit`,
//! `identity` or `account`. [`EventCounter`] tallies them without keeping
//! payloads. Undecodable frames are counted and skipped: a bad record is a
//! per-message problem, not a reason to drop the connection.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::handler::{HandlerError, MessageHandler};
use crate::transport::MessageType;

#[derive(Deserialize)]
struct EventHeader<'a> {
    #[serde(borrow)]
    kind: Option<&'a str>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// All messages received.
    pub messages: u64,
    /// Total payload bytes received.
    pub bytes: u64,
    /// `commit` events.
    pub commits: u64,
    /// `identity` events.
    pub identities: u64,
    /// `account` events.
    pub accounts: u64,
    /// Well-formed events of another or missing kind.
    pub other: u64,
    /// Frames that were not valid JSON events.
    pub malformed: u64,
}

/// Handler that counts Jetstream events by kind.
#[derive(Debug, Default)]
pub struct EventCounter {
    messages: AtomicU64,
    bytes: AtomicU64,
    commits: AtomicU64,
    identities: AtomicU64,
    accounts: AtomicU64,
    other: AtomicU64,
    malformed: AtomicU64,
}

impl EventCounter {
    /// Create a counter with all tallies at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            identities: self.identities.load(Ordering::Relaxed),
            accounts: self.accounts.load(Ordering::Relaxed),
            other: self.other.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn classify(&self, message_type: MessageType, payload: &[u8]) -> &AtomicU64 {
        if message_type == MessageType::Binary {
            // Compressed streams are not decoded here.
            return &self.other;
        }

        match serde_json::from_slice::<EventHeader<'_>>(payload) {
            Ok(header) => match header.kind {
                Some("commit") => &self.commits,
                Some("identity") => &self.identities,
                Some("account") => &self.accounts,
                _ => &self.other,
            },
            Err(e) => {
                debug!(error = %e, bytes = payload.len(), "undecodable jetstream frame");
                &self.malformed
            }
        }
    }
}

impl MessageHandler for EventCounter {
    fn handle(&self, message_type: MessageType, payload: &[u8]) -> Result<(), HandlerError> {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        self.classify(message_type, payload)
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
