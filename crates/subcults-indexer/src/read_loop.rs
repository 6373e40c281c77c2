//! Read loop: dispatches messages from one connection to the handler.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::connection::{ConnectionSlot, Session};
use crate::events::DisconnectReason;
use crate::handler::MessageHandler;
use crate::transport::MessageStream;

/// Consume `session` until it ends, handing each message to `handler`.
///
/// Returns when the peer closes the stream, a read fails, the handler
/// returns an error, the slot closes the connection, or `cancel` fires.
/// In every case the slot is cleared first, then the stream is closed,
/// waiting at most `close_timeout` for the close handshake. Payload bytes
/// are never logged.
pub async fn run_read_loop<S, H>(
    session: &mut Session<S>,
    handler: &H,
    slot: &ConnectionSlot,
    cancel: &CancellationToken,
    close_timeout: Duration,
) -> DisconnectReason
where
    S: MessageStream,
    H: MessageHandler + ?Sized,
{
    let connection_id = session.id;
    let closed = session.closed().clone();

    let reason = loop {
        if cancel.is_cancelled() {
            break DisconnectReason::Cancelled;
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break DisconnectReason::Cancelled,
            () = closed.cancelled() => break DisconnectReason::ClosedLocally,
            next = session.stream.next_message() => next,
        };

        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(connection_id, "jetstream connection closed by peer");
                break DisconnectReason::PeerClosed;
            }
            Err(e) => {
                warn!(connection_id, error = %e, "jetstream connection closed");
                break DisconnectReason::Transport(e.to_string());
            }
        };

        trace!(
            connection_id,
            message_type = message.message_type.code(),
            bytes = message.payload.len(),
            "dispatching message"
        );

        if let Err(e) = handler.handle(message.message_type, &message.payload) {
            error!(connection_id, error = %e, "message handler error");
            break DisconnectReason::Handler(e.to_string());
        }
    };

    slot.close();
    if tokio::time::timeout(close_timeout, session.shutdown())
        .await
        .is_err()
    {
        debug!(connection_id, "gave up waiting for close handshake");
    }
    debug!(connection_id, %reason, "read loop finished");
    reason
}
