//! Message handler seam.

use crate::transport::MessageType;

/// Error returned by a handler to request a disconnect.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Processes messages delivered by the read loop.
///
/// Called synchronously, once per message, in transport order. Returning an
/// error closes the connection and makes the client redial; handlers that
/// want skip-and-continue semantics for a bad message should return `Ok`.
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    ///
    /// # Errors
    ///
    /// Any error is treated as a disconnect signal.
    fn handle(&self, message_type: MessageType, payload: &[u8]) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(MessageType, &[u8]) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, message_type: MessageType, payload: &[u8]) -> Result<(), HandlerError> {
        self(message_type, payload)
    }
}
