//! Transport seam and broker addresses

use std::fmt;

use bytes::Bytes;
use url::Url;

use linker_utils::{LinkerError, Result};

/// Events a transport reports back to the session, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is ready for the handshake
    Open,
    /// One complete frame
    Frame(Bytes),
    /// The connection is gone; `reason` is set when it failed
    Closed { reason: Option<String> },
}

/// Duplex frame channel to the broker
///
/// `open` and `close` only request the transition; completion is reported
/// as [`TransportEvent::Open`] and [`TransportEvent::Closed`].
pub trait Transport: Send {
    fn open(&mut self) -> Result<()>;

    /// Queue one whole frame for sending
    fn send(&mut self, frame: Bytes) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `ws://` or `wss://` URL; frames travel as binary messages
    WebSocket(String),
    /// `tcp://host:port`; frames travel length-prefixed
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parse an address such as `ws://127.0.0.1:12360/ws` or `tcp://10.0.0.2:9000`
    pub fn parse(addr: &str) -> Result<Self> {
        let url = Url::parse(addr)
            .map_err(|e| LinkerError::config(format!("Invalid address '{}': {}", addr, e)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self::WebSocket(url.to_string())),
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| LinkerError::config("Missing host in TCP address"))?;
                let port = url
                    .port()
                    .ok_or_else(|| LinkerError::config("Missing port in TCP address"))?;
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            other => Err(LinkerError::config(format!(
                "Unsupported scheme '{}' in address '{}'",
                other, addr
            ))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket(url) => f.write_str(url),
            Self::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}
