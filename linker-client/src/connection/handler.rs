//! Session lifecycle notifications

use linker_protocol::{Message, ProtocolUnit};
use linker_utils::{LinkerError, Result};

/// One-shot continuation for a request's reply
pub type ReplyCallback = Box<dyn FnOnce(&ProtocolUnit) + Send>;

/// Trait for receiving session notifications
///
/// Every method has a default. `on_error` returns the error, which makes
/// it fatal: the session's event entry point hands it back to the caller
/// and the async driver stops. Override it to keep running through
/// recoverable protocol noise.
pub trait SessionHandler: Send {
    /// The transport is open and the handshake was sent
    fn on_connecting(&mut self) {}

    /// The broker accepted the handshake
    fn on_connected(&mut self) {}

    /// The connection is gone
    fn on_closed(&mut self) {}

    /// A message arrived for a subscribed group
    fn on_message(&mut self, msg: &Message) {
        tracing::info!(
            timestamp = msg.timestamp,
            sequence = msg.sequence,
            group = %msg.group,
            message = %String::from_utf8_lossy(&msg.message),
            "Message received"
        );
    }

    fn on_error(&mut self, err: LinkerError) -> Result<()> {
        Err(err)
    }
}

/// Handler with every default in place
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl SessionHandler for DefaultHandler {}

/// Simple callback-based handler for incoming messages
pub struct CallbackHandler<F>
where
    F: FnMut(&Message) + Send,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: FnMut(&Message) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> SessionHandler for CallbackHandler<F>
where
    F: FnMut(&Message) + Send,
{
    fn on_message(&mut self, msg: &Message) {
        (self.callback)(msg);
    }
}
