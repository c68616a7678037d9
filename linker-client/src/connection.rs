//! Broker connection plumbing
//!
//! The session talks to the outside world through the [`Transport`] trait
//! and receives [`TransportEvent`]s back. [`ChannelTransport`] is the
//! production implementation: it runs WebSocket or TCP I/O on a tokio task
//! and reports through an mpsc channel.

mod channel;
mod handler;
mod transport;

pub use channel::{ChannelTransport, TransportOptions};
pub use handler::{CallbackHandler, DefaultHandler, ReplyCallback, SessionHandler};
pub use transport::{Endpoint, Transport, TransportEvent};
