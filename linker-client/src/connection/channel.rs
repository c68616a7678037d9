//! Channel-backed transport running socket I/O on a tokio task

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::codec::Framed;

use linker_protocol::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
use linker_utils::{LinkerError, Result};

use super::transport::{Endpoint, Transport, TransportEvent};

/// Default time allowed to establish the connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// I/O tuning for [`ChannelTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    /// Largest frame accepted on `tcp://` endpoints
    pub max_frame_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

enum Command {
    Frame(Bytes),
    Close,
}

/// Transport whose I/O runs on a spawned task
///
/// Events are delivered on the sender passed to [`ChannelTransport::new`];
/// the task always ends by emitting [`TransportEvent::Closed`].
pub struct ChannelTransport {
    endpoint: Endpoint,
    options: TransportOptions,
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelTransport {
    pub fn new(
        endpoint: Endpoint,
        options: TransportOptions,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            endpoint,
            options,
            events,
            commands: None,
            task: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Transport for ChannelTransport {
    fn open(&mut self) -> Result<()> {
        if self.commands.is_some() {
            return Err(LinkerError::transport("Transport already opened"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LinkerError::transport(format!("No async runtime: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.commands = Some(tx);
        self.task = Some(runtime.spawn(io_task(
            self.endpoint.clone(),
            self.options.clone(),
            rx,
            self.events.clone(),
        )));

        tracing::debug!(endpoint = %self.endpoint, "Transport task spawned");
        Ok(())
    }

    fn send(&mut self, frame: Bytes) -> Result<()> {
        let commands = self.commands.as_ref().ok_or(LinkerError::ConnectionClosed)?;
        commands
            .send(Command::Frame(frame))
            .map_err(|_| LinkerError::ConnectionClosed)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(commands) = &self.commands {
            // A finished task has already reported Closed
            let _ = commands.send(Command::Close);
        }
        Ok(())
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn io_task(
    endpoint: Endpoint,
    options: TransportOptions,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let result = match &endpoint {
        Endpoint::Tcp { host, port } => {
            run_tcp(format!("{}:{}", host, port), &options, commands, &events).await
        }
        Endpoint::WebSocket(url) => run_websocket(url, &options, commands, &events).await,
    };

    let reason = match result {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(endpoint = %endpoint, error = %e, "Transport failed");
            Some(e.to_string())
        }
    };
    let _ = events.send(TransportEvent::Closed { reason });
}

async fn with_connect_timeout<F, T, E>(timeout: Duration, connect: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(LinkerError::connection(e.to_string())),
        // Rounded up so sub-second timeouts never read as 0s
        Err(_) => Err(LinkerError::ConnectionTimeout {
            seconds: timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0),
        }),
    }
}

async fn run_tcp(
    addr: String,
    options: &TransportOptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<()> {
    let stream = with_connect_timeout(options.connect_timeout, TcpStream::connect(&addr)).await?;
    let mut framed = Framed::new(
        stream,
        FrameCodec::with_max_frame_size(options.max_frame_size),
    );

    tracing::info!(addr = %addr, "Connected over TCP");
    if events.send(TransportEvent::Open).is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(frame)) => {
                    framed
                        .send(frame)
                        .await
                        .map_err(|e| LinkerError::transport(e.to_string()))?;
                }
                Some(Command::Close) | None => {
                    let _ = SinkExt::<Bytes>::close(&mut framed).await;
                    return Ok(());
                }
            },

            incoming = framed.next() => match incoming {
                Some(Ok(frame)) => {
                    if events.send(TransportEvent::Frame(frame)).is_err() {
                        tracing::debug!("Event receiver dropped");
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(LinkerError::transport(e.to_string())),
                None => {
                    tracing::info!("Broker closed connection");
                    return Ok(());
                }
            },
        }
    }
}

async fn run_websocket(
    url: &str,
    options: &TransportOptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<()> {
    let (ws_stream, _) = with_connect_timeout(options.connect_timeout, connect_async(url)).await?;
    let (mut write, mut read) = ws_stream.split();

    tracing::info!(url, "Connected over WebSocket");
    if events.send(TransportEvent::Open).is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(frame)) => {
                    write
                        .send(WsMessage::Binary(frame.to_vec()))
                        .await
                        .map_err(|e| LinkerError::transport(e.to_string()))?;
                }
                Some(Command::Close) | None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            },

            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Binary(data))) => {
                    if events.send(TransportEvent::Frame(Bytes::from(data))).is_err() {
                        tracing::debug!("Event receiver dropped");
                        return Ok(());
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    write
                        .send(WsMessage::Pong(data))
                        .await
                        .map_err(|e| LinkerError::transport(e.to_string()))?;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!(frame = ?frame, "Broker closed WebSocket");
                    return Ok(());
                }
                Some(Ok(WsMessage::Text(_))) => {
                    tracing::warn!("Ignoring text frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(LinkerError::transport(e.to_string())),
                None => {
                    tracing::info!("WebSocket stream ended");
                    return Ok(());
                }
            },
        }
    }
}
