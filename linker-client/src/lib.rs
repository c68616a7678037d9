//! linker-client: Client session for Linker-IM
//!
//! [`Session`] is the transport-agnostic state machine: it sends the
//! handshake, assigns request ids, matches replies to their callbacks and
//! forwards everything else to a [`SessionHandler`]. [`Client`] drives a
//! session over WebSocket or TCP on a tokio runtime.

pub mod client;
pub mod config;
pub mod connection;
pub mod session;

pub use client::Client;
pub use config::ClientConfig;
pub use connection::{
    CallbackHandler, ChannelTransport, DefaultHandler, Endpoint, ReplyCallback, SessionHandler,
    Transport, TransportEvent, TransportOptions,
};
pub use session::{ConnectionState, Session};
