//! Scripted transport and recording handler for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::handler::{HandlerError, MessageHandler};
use crate::transport::{BoxFuture, Dialer, Message, MessageStream, MessageType};

/// One step a scripted stream plays back.
#[derive(Debug)]
pub(crate) enum StreamStep {
    Message(Message),
    Error(&'static str),
    Eof,
}

/// Result of one scripted dial.
pub(crate) enum DialOutcome {
    Fail(String),
    Connect(Vec<StreamStep>),
    /// Connects, but closing the stream never completes.
    StallingClose(Vec<StreamStep>),
}

impl DialOutcome {
    pub(crate) fn fail(reason: &str) -> Self {
        Self::Fail(reason.to_string())
    }

    pub(crate) fn connect(steps: Vec<StreamStep>) -> Self {
        Self::Connect(steps)
    }

    pub(crate) fn stalling_close(steps: Vec<StreamStep>) -> Self {
        Self::StallingClose(steps)
    }
}

/// Dialer that plays back a fixed script, then hangs forever.
pub(crate) struct ScriptedDialer {
    script: Mutex<VecDeque<DialOutcome>>,
    dials: Mutex<Vec<Instant>>,
    exhausted: Notify,
    closes: Arc<AtomicUsize>,
}

impl ScriptedDialer {
    pub(crate) fn new(script: impl IntoIterator<Item = DialOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            dials: Mutex::new(Vec::new()),
            exhausted: Notify::new(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Resolves once a dial has been attempted past the end of the script.
    pub(crate) async fn exhausted(&self) {
        self.exhausted.notified().await;
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.dials.lock().len()
    }

    /// Time between consecutive dials.
    pub(crate) fn gaps(&self) -> Vec<Duration> {
        self.dials
            .lock()
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    /// Number of streams that were closed.
    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Dialer for ScriptedDialer {
    type Stream = ScriptedStream;

    fn dial<'a>(
        &'a self,
        _endpoint: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<Self::Stream, TransportError>> {
        Box::pin(async move {
            self.dials.lock().push(Instant::now());
            let next = self.script.lock().pop_front();
            match next {
                Some(DialOutcome::Fail(reason)) => Err(TransportError::Connect(reason)),
                Some(DialOutcome::Connect(steps)) => Ok(ScriptedStream {
                    steps: steps.into(),
                    closes: Arc::clone(&self.closes),
                    close_hangs: false,
                }),
                Some(DialOutcome::StallingClose(steps)) => Ok(ScriptedStream {
                    steps: steps.into(),
                    closes: Arc::clone(&self.closes),
                    close_hangs: true,
                }),
                None => {
                    self.exhausted.notify_one();
                    std::future::pending::<Result<ScriptedStream, TransportError>>().await
                }
            }
        })
    }
}

/// Stream that plays back scripted steps, then blocks forever.
#[derive(Debug)]
pub(crate) struct ScriptedStream {
    steps: VecDeque<StreamStep>,
    closes: Arc<AtomicUsize>,
    close_hangs: bool,
}

impl MessageStream for ScriptedStream {
    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<Message>, TransportError>> {
        Box::pin(async move {
            match self.steps.pop_front() {
                Some(StreamStep::Message(message)) => Ok(Some(message)),
                Some(StreamStep::Error(reason)) => Err(TransportError::Connect(reason.to_string())),
                Some(StreamStep::Eof) => Ok(None),
                None => std::future::pending().await,
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.close_hangs {
                std::future::pending::<()>().await;
            }
            Err(TransportError::Connect("already closed".to_string()))
        })
    }
}

/// Handler that records every message and fails on a chosen payload.
#[derive(Default)]
pub(crate) struct RecordingHandler {
    seen: Mutex<Vec<(MessageType, Vec<u8>)>>,
    fail_on: Option<&'static [u8]>,
}

impl RecordingHandler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_on(payload: &'static [u8]) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail_on: Some(payload),
        }
    }

    pub(crate) fn payloads(&self) -> Vec<Vec<u8>> {
        self.seen.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub(crate) fn types(&self) -> Vec<MessageType> {
        self.seen.lock().iter().map(|(t, _)| *t).collect()
    }
}

impl MessageHandler for RecordingHandler {
    fn handle(&self, message_type: MessageType, payload: &[u8]) -> Result<(), HandlerError> {
        self.seen.lock().push((message_type, payload.to_vec()));
        if self.fail_on == Some(payload) {
            return Err("rejected payload".into());
        }
        Ok(())
    }
}

pub(crate) fn text(payload: &'static str) -> StreamStep {
    StreamStep::Message(Message::text(payload))
}
