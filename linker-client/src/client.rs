//! Async driver for a [`Session`]
//!
//! [`Client`] owns a session over a [`ChannelTransport`] and the receiving
//! end of its event channel. Events are fed to the session one at a time,
//! so all session state changes happen on the caller's task.

use tokio::sync::mpsc;

use linker_protocol::PushMessage;
use linker_utils::{LinkerError, Result};

use crate::config::ClientConfig;
use crate::connection::{
    ChannelTransport, Endpoint, ReplyCallback, SessionHandler, TransportEvent, TransportOptions,
};
use crate::session::{ConnectionState, Session};

/// Linker-IM client bound to one broker endpoint
pub struct Client<H: SessionHandler> {
    endpoint: Endpoint,
    options: TransportOptions,
    session: Session<ChannelTransport, H>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl<H: SessionHandler> Client<H> {
    pub fn new(endpoint: Endpoint, handler: H) -> Self {
        Self::with_options(endpoint, TransportOptions::default(), handler)
    }

    pub fn with_options(endpoint: Endpoint, options: TransportOptions, handler: H) -> Self {
        Self {
            endpoint,
            options,
            session: Session::new(handler),
            events: None,
        }
    }

    /// Build a client for the configured address
    pub fn from_config(config: &ClientConfig, handler: H) -> Result<Self> {
        let endpoint = Endpoint::parse(&config.resolve_addr(&config.addr))?;
        Ok(Self::with_options(
            endpoint,
            config.transport_options(),
            handler,
        ))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn session(&self) -> &Session<ChannelTransport, H> {
        &self.session
    }

    pub fn handler(&self) -> &H {
        self.session.handler()
    }

    pub fn handler_mut(&mut self) -> &mut H {
        self.session.handler_mut()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Start connecting; drive with [`Client::wait_connected`] or [`Client::run`]
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        &mut self,
        namespace: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(self.endpoint.clone(), self.options.clone(), tx);
        self.session.connect(transport, namespace, credential)?;
        self.events = Some(rx);
        Ok(())
    }

    /// Process events until the broker accepts the handshake
    ///
    /// Fails with [`LinkerError::ConnectionClosed`] if the connection ends
    /// first, for instance after an authentication failure.
    pub async fn wait_connected(&mut self) -> Result<()> {
        loop {
            if self.session.is_connected() {
                return Ok(());
            }
            if !self.poll_event().await? {
                return Err(LinkerError::ConnectionClosed);
            }
        }
    }

    /// Wait for and process one transport event
    ///
    /// Returns `Ok(false)` once there is no connection left to drive. Safe
    /// to use as a `tokio::select!` branch: a cancelled call loses no event.
    pub async fn poll_event(&mut self) -> Result<bool> {
        let Some(events) = self.events.as_mut() else {
            return Ok(false);
        };

        match events.recv().await {
            Some(event) => {
                let closed = matches!(event, TransportEvent::Closed { .. });
                if closed {
                    self.events = None;
                }
                self.session.handle_event(event)?;
                Ok(true)
            }
            None => {
                // The task died without reporting; treat it as a close
                self.events = None;
                if self.session.state() != ConnectionState::Closed {
                    self.session.handle_close(Some("transport task ended"));
                }
                Ok(false)
            }
        }
    }

    /// Process events until the connection closes
    pub async fn run(&mut self) -> Result<()> {
        while self.poll_event().await? {}
        Ok(())
    }

    pub fn push(
        &mut self,
        messages: Vec<PushMessage>,
        on_reply: Option<ReplyCallback>,
    ) -> Result<u32> {
        self.session.push(messages, on_reply)
    }

    pub fn subscribe(&mut self, group: &str, on_reply: Option<ReplyCallback>) -> Result<u32> {
        self.session.subscribe(group, on_reply)
    }

    pub fn unsubscribe(&mut self, group: &str, on_reply: Option<ReplyCallback>) -> Result<u32> {
        self.session.unsubscribe(group, on_reply)
    }

    /// Request shutdown; keep driving with [`Client::run`] to observe it
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_util::codec::Framed;

    use linker_protocol::{
        decode, ConnectedReply, FrameCodec, Message, ProtocolUnit, SubscribeOp, UnitBody, UnitType,
    };

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        messages: Arc<Mutex<Vec<Message>>>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl SessionHandler for Recorder {
        fn on_connecting(&mut self) {
            self.events.lock().unwrap().push("connecting".into());
        }

        fn on_connected(&mut self) {
            self.events.lock().unwrap().push("connected".into());
        }

        fn on_closed(&mut self) {
            self.events.lock().unwrap().push("closed".into());
        }

        fn on_message(&mut self, msg: &Message) {
            self.messages.lock().unwrap().push(msg.clone());
        }

        fn on_error(&mut self, err: LinkerError) -> Result<()> {
            self.errors.lock().unwrap().push(err.to_string());
            Ok(())
        }
    }

    fn tcp_endpoint(port: u16) -> Endpoint {
        Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        }
    }

    fn frame(request_id: u32, body: UnitBody) -> Bytes {
        ProtocolUnit::new(request_id, body).encode().unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::new());

            let hello = decode(&framed.next().await.unwrap().unwrap()).unwrap();
            assert_eq!(hello.request_id, 0);
            match hello.body {
                UnitBody::Connect(req) => {
                    assert_eq!(req.namespace, "app1");
                    assert_eq!(req.credential, "tok");
                }
                other => panic!("expected connect, got {:?}", other),
            }
            framed
                .send(frame(
                    0,
                    UnitBody::Connected(ConnectedReply {
                        auth_error: String::new(),
                        session: Bytes::from_static(&[0x01, 0x02]),
                    }),
                ))
                .await
                .unwrap();

            let sub = decode(&framed.next().await.unwrap().unwrap()).unwrap();
            assert_eq!(sub.request_id, 1);
            match sub.body {
                UnitBody::Subscription(req) => {
                    assert_eq!(req.op, SubscribeOp::Sub);
                    assert_eq!(req.group, "news");
                    assert_eq!(req.session, Bytes::from_static(&[0x01, 0x02]));
                }
                other => panic!("expected subscription, got {:?}", other),
            }
            framed.send(frame(1, UnitBody::PushResult)).await.unwrap();
            framed
                .send(frame(
                    0,
                    UnitBody::Message(Message {
                        timestamp: 1_700_000_000,
                        sequence: 1,
                        group: "news".into(),
                        message: Bytes::from_static(b"hello"),
                    }),
                ))
                .await
                .unwrap();

            // The client hangs up
            assert!(framed.next().await.is_none());
        });

        let recorder = Recorder::default();
        let mut client = Client::new(tcp_endpoint(port), recorder.clone());
        client.connect("app1", "tok").unwrap();
        client.wait_connected().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.session().cursor(), 1);

        let (tx, rx) = oneshot::channel();
        let id = client
            .subscribe(
                "news",
                Some(Box::new(move |unit: &ProtocolUnit| {
                    let _ = tx.send(unit.unit_type());
                })),
            )
            .unwrap();
        assert_eq!(id, 1);

        // PushResult, then the message
        assert!(client.poll_event().await.unwrap());
        assert_eq!(rx.await.unwrap(), UnitType::PushResult);
        assert_eq!(client.session().pending_replies(), 0);

        assert!(client.poll_event().await.unwrap());
        {
            let messages = recorder.messages.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].group, "news");
            assert_eq!(messages[0].message, Bytes::from_static(b"hello"));
        }

        client.close().unwrap();
        client.run().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["connecting", "connected", "closed"]
        );
        assert!(recorder.errors.lock().unwrap().is_empty());

        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let broker = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::new());
            framed.next().await.unwrap().unwrap();
            framed
                .send(frame(
                    0,
                    UnitBody::Connected(ConnectedReply {
                        auth_error: "invalid credential".into(),
                        session: Bytes::new(),
                    }),
                ))
                .await
                .unwrap();
            // Wait for the client's close request
            let _ = framed.next().await;
        });

        let recorder = Recorder::default();
        let mut client = Client::new(tcp_endpoint(port), recorder.clone());
        client.connect("app1", "wrong").unwrap();

        let result = client.wait_connected().await;
        assert!(matches!(result, Err(LinkerError::ConnectionClosed)));
        assert_eq!(client.state(), ConnectionState::Closed);

        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid credential"));

        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let recorder = Recorder::default();
        let mut client = Client::new(tcp_endpoint(port), recorder.clone());
        client.connect("app1", "tok").unwrap();

        let result = client.wait_connected().await;
        assert!(matches!(result, Err(LinkerError::ConnectionClosed)));
        assert_eq!(*recorder.events.lock().unwrap(), vec!["closed"]);
    }

    #[tokio::test]
    async fn test_poll_without_connection() {
        let mut client = Client::new(tcp_endpoint(1), Recorder::default());
        assert!(!client.poll_event().await.unwrap());
        assert!(client.run().await.is_ok());
        assert!(matches!(
            client.subscribe("news", None),
            Err(LinkerError::Operation(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_resolves_remote() {
        let mut config = ClientConfig {
            addr: "lab".into(),
            ..ClientConfig::default()
        };
        config
            .remotes
            .insert("lab".into(), "tcp://10.0.0.2:9000".into());

        let client = Client::from_config(&config, Recorder::default()).unwrap();
        assert_eq!(
            client.endpoint(),
            &Endpoint::Tcp {
                host: "10.0.0.2".into(),
                port: 9000
            }
        );
    }
}
