//! Client session state machine
//!
//! A [`Session`] owns one transport and walks it through
//! `Closed -> Connecting -> Connected -> Closed`. It is driven from outside:
//! whatever runs the transport feeds every [`TransportEvent`] to
//! [`Session::handle_event`], one at a time, in arrival order.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, info, warn};

use linker_protocol::{
    decode, encode_connect_request, encode_push_request, encode_subscription, ConnectedReply,
    ErrorReply, ProtocolError, ProtocolUnit, PushMessage, SubscribeOp, UnitBody,
};
use linker_utils::{LinkerError, Result};

use crate::connection::{ReplyCallback, SessionHandler, Transport, TransportEvent};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Connected,
}

/// Handshake waiting for the transport to open
struct PendingConnect {
    namespace: String,
    frame: Bytes,
}

/// One logical session with the broker
pub struct Session<T: Transport, H: SessionHandler> {
    state: ConnectionState,
    transport: Option<T>,
    handler: H,
    handshake: Option<PendingConnect>,
    session_token: Option<Bytes>,
    namespace: Option<String>,
    cursor: u32,
    pending: HashMap<u32, ReplyCallback>,
}

impl<T: Transport, H: SessionHandler> Session<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            state: ConnectionState::Closed,
            transport: None,
            handler,
            handshake: None,
            session_token: None,
            namespace: None,
            cursor: 0,
            pending: HashMap::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Token issued by the broker; only held while connected
    pub fn session_token(&self) -> Option<&Bytes> {
        self.session_token.as_ref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Next request id to assign
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Number of replies still awaited
    pub fn pending_replies(&self) -> usize {
        self.pending.len()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Start connecting over `transport`
    ///
    /// The handshake is encoded up front so oversized fields fail here.
    /// It is sent once the transport reports [`TransportEvent::Open`].
    pub fn connect(
        &mut self,
        mut transport: T,
        namespace: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<()> {
        if self.transport.is_some() || self.state != ConnectionState::Closed {
            return Err(LinkerError::operation("Already connected or connecting."));
        }

        let namespace = namespace.into();
        let frame = encode_connect_request(&namespace, &credential.into())?;

        transport.open()?;
        debug!(namespace = %namespace, "Opening transport");

        self.transport = Some(transport);
        self.handshake = Some(PendingConnect { namespace, frame });
        Ok(())
    }

    /// Ask the transport to shut down
    ///
    /// The session becomes Closed once the transport confirms.
    pub fn close(&mut self) -> Result<()> {
        match self.transport.as_mut() {
            Some(transport) => transport.close(),
            None => Ok(()),
        }
    }

    pub fn push(
        &mut self,
        messages: Vec<PushMessage>,
        on_reply: Option<ReplyCallback>,
    ) -> Result<u32> {
        if messages.is_empty() {
            return Err(LinkerError::operation("Nothing to push."));
        }
        self.send_request(
            |session, request_id, namespace| {
                encode_push_request(session, request_id, namespace, &messages)
            },
            on_reply,
        )
    }

    pub fn subscribe(&mut self, group: &str, on_reply: Option<ReplyCallback>) -> Result<u32> {
        self.send_request(
            |session, request_id, namespace| {
                encode_subscription(session, request_id, namespace, group, SubscribeOp::Sub)
            },
            on_reply,
        )
    }

    pub fn unsubscribe(&mut self, group: &str, on_reply: Option<ReplyCallback>) -> Result<u32> {
        self.send_request(
            |session, request_id, namespace| {
                encode_subscription(session, request_id, namespace, group, SubscribeOp::Unsub)
            },
            on_reply,
        )
    }

    fn send_request<F>(&mut self, encode: F, on_reply: Option<ReplyCallback>) -> Result<u32>
    where
        F: FnOnce(&[u8], u32, &str) -> std::result::Result<Bytes, ProtocolError>,
    {
        if self.state != ConnectionState::Connected {
            return Err(LinkerError::not_connected());
        }
        let (Some(token), Some(namespace), Some(transport)) = (
            self.session_token.as_ref(),
            self.namespace.as_deref(),
            self.transport.as_mut(),
        ) else {
            return Err(LinkerError::not_connected());
        };

        let request_id = self.cursor;
        let frame = encode(&token[..], request_id, namespace)?;
        transport.send(frame)?;

        if let Some(callback) = on_reply {
            self.pending.insert(request_id, callback);
        }
        // Id 0 belongs to the handshake
        self.cursor = self.cursor.wrapping_add(1).max(1);

        debug!(request_id, "Request sent");
        Ok(request_id)
    }

    /// Process one transport event
    ///
    /// Returns `Err` only when the handler's `on_error` does.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Open => self.handle_open(),
            TransportEvent::Frame(frame) => self.handle_frame(frame),
            TransportEvent::Closed { reason } => {
                self.handle_close(reason.as_deref());
                Ok(())
            }
        }
    }

    /// The transport is ready: send the handshake
    pub fn handle_open(&mut self) -> Result<()> {
        let Some(handshake) = self.handshake.take() else {
            warn!("Transport opened without a pending connect");
            return Ok(());
        };
        let Some(transport) = self.transport.as_mut() else {
            return self.report(LinkerError::internal("Handshake pending without transport"));
        };

        if let Err(e) = transport.send(handshake.frame) {
            return self.report(e);
        }

        self.state = ConnectionState::Connecting;
        self.namespace = Some(handshake.namespace);
        info!(namespace = ?self.namespace, "Connecting");
        self.handler.on_connecting();
        Ok(())
    }

    /// Decode and dispatch one frame
    pub fn handle_frame(&mut self, frame: Bytes) -> Result<()> {
        let unit = match decode(&frame) {
            Ok(unit) => unit,
            Err(e) => return self.report(e.into()),
        };
        debug!(unit_type = %unit.unit_type(), request_id = unit.request_id, "Received unit");

        if let Some(on_reply) = self.pending.remove(&unit.request_id) {
            on_reply(&unit);
        }

        let request_id = unit.request_id;
        match unit.body {
            UnitBody::Connected(reply) => self.on_connected(reply, frame, request_id),
            UnitBody::Message(msg) => {
                if self.state == ConnectionState::Connected {
                    self.handler.on_message(&msg);
                } else {
                    warn!(
                        state = ?self.state,
                        group = %msg.group,
                        "Dropping message outside a live session"
                    );
                }
                Ok(())
            }
            UnitBody::Error(ErrorReply { message }) => {
                if message.is_empty() {
                    return Ok(());
                }
                self.report(LinkerError::operation(format!(
                    "request {} rejected: {}",
                    request_id, message
                )))
            }
            _ => Ok(()),
        }
    }

    fn on_connected(&mut self, reply: ConnectedReply, frame: Bytes, request_id: u32) -> Result<()> {
        if self.state != ConnectionState::Connecting {
            return self.report(ProtocolError::unexpected_connected(frame, request_id).into());
        }

        if !reply.is_authenticated() {
            if let Some(transport) = self.transport.as_mut() {
                if let Err(e) = transport.close() {
                    warn!(error = %e, "Failed to close transport after auth failure");
                }
            }
            return self.report(LinkerError::auth(reply.auth_error));
        }

        self.state = ConnectionState::Connected;
        self.session_token = Some(reply.session);
        self.cursor = 1;
        info!(namespace = ?self.namespace, "Connected");
        self.handler.on_connected();
        Ok(())
    }

    /// The transport is gone: reset everything
    pub fn handle_close(&mut self, reason: Option<&str>) {
        let dropped = self.pending.len();
        if dropped > 0 {
            debug!(dropped, "Discarding pending replies");
        }

        self.state = ConnectionState::Closed;
        self.transport = None;
        self.handshake = None;
        self.session_token = None;
        self.namespace = None;
        self.cursor = 0;
        self.pending.clear();

        match reason {
            Some(reason) => info!(reason, "Connection closed"),
            None => info!("Connection closed"),
        }
        self.handler.on_closed();
    }

    fn report(&mut self, err: LinkerError) -> Result<()> {
        warn!(error = %err, "Session error");
        self.handler.on_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use linker_protocol::{
        ConnectKind, ErrorReply, Message, ProtocolErrorKind, SubscriptionRequest, UnitType,
    };

    use crate::connection::DefaultHandler;

    #[derive(Default)]
    struct TransportLog {
        opened: usize,
        closed: usize,
        sent: Vec<Bytes>,
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        log: Arc<Mutex<TransportLog>>,
    }

    impl MockTransport {
        fn sent(&self) -> Vec<Bytes> {
            self.log.lock().unwrap().sent.clone()
        }

        fn closed(&self) -> usize {
            self.log.lock().unwrap().closed
        }
    }

    impl Transport for MockTransport {
        fn open(&mut self) -> Result<()> {
            self.log.lock().unwrap().opened += 1;
            Ok(())
        }

        fn send(&mut self, frame: Bytes) -> Result<()> {
            self.log.lock().unwrap().sent.push(frame);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        messages: Arc<Mutex<Vec<Message>>>,
        errors: Arc<Mutex<Vec<LinkerError>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
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
            self.errors.lock().unwrap().push(err);
            Ok(())
        }
    }

    fn connected_frame(auth_error: &str, session: &'static [u8]) -> Bytes {
        ProtocolUnit::new(
            0,
            UnitBody::Connected(ConnectedReply {
                auth_error: auth_error.into(),
                session: Bytes::from_static(session),
            }),
        )
        .encode()
        .unwrap()
    }

    fn unit_frame(request_id: u32, body: UnitBody) -> Bytes {
        ProtocolUnit::new(request_id, body).encode().unwrap()
    }

    fn connected_session() -> (Session<MockTransport, Recorder>, MockTransport, Recorder) {
        let transport = MockTransport::default();
        let recorder = Recorder::default();
        let mut session = Session::new(recorder.clone());
        session.connect(transport.clone(), "app1", "tok").unwrap();
        session.handle_event(TransportEvent::Open).unwrap();
        session
            .handle_event(TransportEvent::Frame(connected_frame("", &[0x01, 0x02])))
            .unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        (session, transport, recorder)
    }

    fn counting_callback(count: &Arc<AtomicUsize>) -> Option<ReplyCallback> {
        let count = Arc::clone(count);
        Some(Box::new(move |_unit: &ProtocolUnit| {
            count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_new_session_is_closed() {
        let session: Session<MockTransport, DefaultHandler> = Session::new(DefaultHandler);
        assert_eq!(session.state(), ConnectionState::Closed);
        assert_eq!(session.cursor(), 0);
        assert!(session.session_token().is_none());
        assert!(session.namespace().is_none());
        assert_eq!(session.pending_replies(), 0);
    }

    #[test]
    fn test_connect_waits_for_open() {
        let transport = MockTransport::default();
        let recorder = Recorder::default();
        let mut session = Session::new(recorder.clone());

        session.connect(transport.clone(), "app1", "tok").unwrap();
        assert_eq!(transport.log.lock().unwrap().opened, 1);
        assert!(transport.sent().is_empty());
        assert_eq!(session.state(), ConnectionState::Closed);

        session.handle_event(TransportEvent::Open).unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert_eq!(session.namespace(), Some("app1"));
        assert_eq!(recorder.events(), vec!["connecting"]);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let unit = decode(&sent[0]).unwrap();
        assert_eq!(unit.request_id, 0);
        match unit.body {
            UnitBody::Connect(req) => {
                assert_eq!(req.kind, ConnectKind::Basic);
                assert_eq!(req.namespace, "app1");
                assert_eq!(req.credential, "tok");
            }
            other => panic!("expected connect, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_twice_rejected() {
        let mut session = Session::new(Recorder::default());
        session.connect(MockTransport::default(), "app1", "tok").unwrap();

        let second = MockTransport::default();
        let result = session.connect(second.clone(), "app1", "tok");
        assert!(matches!(result, Err(LinkerError::Operation(_))));
        assert_eq!(second.log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_connect_rejects_oversized_namespace() {
        let transport = MockTransport::default();
        let mut session = Session::new(Recorder::default());
        let namespace = "n".repeat(70_000);

        let result = session.connect(transport.clone(), namespace, "tok");
        assert!(matches!(result, Err(LinkerError::Protocol(_))));
        assert_eq!(transport.log.lock().unwrap().opened, 0);
    }

    #[test]
    fn test_connected_reply() {
        let (session, _transport, recorder) = connected_session();
        assert_eq!(session.cursor(), 1);
        assert_eq!(
            session.session_token(),
            Some(&Bytes::from_static(&[0x01, 0x02]))
        );
        assert_eq!(recorder.events(), vec!["connecting", "connected"]);
    }

    #[test]
    fn test_connected_while_closed_is_protocol_error() {
        let recorder = Recorder::default();
        let mut session: Session<MockTransport, Recorder> = Session::new(recorder.clone());

        session
            .handle_event(TransportEvent::Frame(connected_frame("", &[0x01])))
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.session_token().is_none());
        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            LinkerError::Protocol(e) => {
                assert_eq!(e.kind, ProtocolErrorKind::UnexpectedConnected);
                assert!(!e.raw.is_empty());
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_connected_while_connected_is_protocol_error() {
        let (mut session, _transport, recorder) = connected_session();

        session
            .handle_event(TransportEvent::Frame(connected_frame("", &[0x09])))
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(
            session.session_token(),
            Some(&Bytes::from_static(&[0x01, 0x02]))
        );
        assert_eq!(session.cursor(), 1);
        let errors = recorder.errors.lock().unwrap();
        assert!(matches!(errors.as_slice(), [LinkerError::Protocol(_)]));
    }

    #[test]
    fn test_auth_failure() {
        let transport = MockTransport::default();
        let recorder = Recorder::default();
        let mut session = Session::new(recorder.clone());
        session.connect(transport.clone(), "app1", "bad").unwrap();
        session.handle_event(TransportEvent::Open).unwrap();

        session
            .handle_event(TransportEvent::Frame(connected_frame("bad credential", &[])))
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.session_token().is_none());
        assert_eq!(transport.closed(), 1);
        let errors = recorder.errors.lock().unwrap();
        match errors.as_slice() {
            [LinkerError::Auth(msg)] => assert_eq!(msg, "bad credential"),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_operations_require_connection() {
        let transport = MockTransport::default();
        let mut session = Session::new(Recorder::default());
        let count = Arc::new(AtomicUsize::new(0));

        // Closed
        let result = session.subscribe("news", counting_callback(&count));
        assert!(matches!(result, Err(LinkerError::Operation(_))));

        // Connecting
        session.connect(transport.clone(), "app1", "tok").unwrap();
        session.handle_event(TransportEvent::Open).unwrap();
        let result = session.push(
            vec![PushMessage::new("news", "hi")],
            counting_callback(&count),
        );
        assert!(matches!(result, Err(LinkerError::Operation(_))));
        let result = session.unsubscribe("news", counting_callback(&count));
        assert!(matches!(result, Err(LinkerError::Operation(_))));

        assert_eq!(session.pending_replies(), 0);
        // Only the handshake went out
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_push_empty_rejected() {
        let (mut session, transport, _recorder) = connected_session();
        let before = transport.sent().len();

        let result = session.push(Vec::new(), None);
        assert!(matches!(result, Err(LinkerError::Operation(_))));
        assert_eq!(transport.sent().len(), before);
        assert_eq!(session.cursor(), 1);
    }

    #[test]
    fn test_push_frame() {
        let (mut session, transport, _recorder) = connected_session();

        let id = session
            .push(
                vec![
                    PushMessage::new("roomA", "hello"),
                    PushMessage::new("roomB", Bytes::new()),
                ],
                None,
            )
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(session.cursor(), 2);
        assert_eq!(session.pending_replies(), 0);

        let sent = transport.sent();
        let unit = decode(sent.last().unwrap()).unwrap();
        assert_eq!(unit.request_id, 1);
        match unit.body {
            UnitBody::Push(req) => {
                assert_eq!(req.namespace, "app1");
                assert_eq!(req.session, Bytes::from_static(&[0x01, 0x02]));
                assert_eq!(req.messages.len(), 2);
                assert_eq!(req.messages[0].group, "roomA");
                assert_eq!(req.messages[0].data, Bytes::from_static(b"hello"));
            }
            other => panic!("expected push, got {:?}", other),
        }
    }

    #[test]
    fn test_unsubscribe_frame() {
        let (mut session, transport, _recorder) = connected_session();

        session.unsubscribe("news", None).unwrap();

        let unit = decode(transport.sent().last().unwrap()).unwrap();
        assert_eq!(
            unit.body,
            UnitBody::Subscription(SubscriptionRequest {
                op: SubscribeOp::Unsub,
                namespace: "app1".into(),
                session: Bytes::from_static(&[0x01, 0x02]),
                group: "news".into(),
            })
        );
    }

    #[test]
    fn test_cursor_assignment_and_reply_correlation() {
        let (mut session, _transport, _recorder) = connected_session();
        for expected in 1..5 {
            assert_eq!(session.subscribe("warmup", None).unwrap(), expected);
        }
        assert_eq!(session.cursor(), 5);

        let count = Arc::new(AtomicUsize::new(0));
        let id = session.subscribe("roomA", counting_callback(&count)).unwrap();
        assert_eq!(id, 5);
        assert_eq!(session.cursor(), 6);
        assert_eq!(session.pending_replies(), 1);

        session
            .handle_event(TransportEvent::Frame(unit_frame(5, UnitBody::PushResult)))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(session.pending_replies(), 0);

        // A duplicate reply finds nothing to fire
        session
            .handle_event(TransportEvent::Frame(unit_frame(5, UnitBody::PushResult)))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_to_end_example() {
        let transport = MockTransport::default();
        let recorder = Recorder::default();
        let mut session = Session::new(recorder.clone());

        session.connect(transport.clone(), "app1", "tok").unwrap();
        session.handle_event(TransportEvent::Open).unwrap();
        assert_eq!(decode(&transport.sent()[0]).unwrap().request_id, 0);

        session
            .handle_event(TransportEvent::Frame(connected_frame("", &[0x01, 0x02])))
            .unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.cursor(), 1);

        let replies = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&replies);
        let id = session
            .subscribe(
                "news",
                Some(Box::new(move |unit: &ProtocolUnit| {
                    seen.lock().unwrap().push(unit.unit_type());
                })),
            )
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(decode(&transport.sent()[1]).unwrap().request_id, 1);

        session
            .handle_event(TransportEvent::Frame(unit_frame(1, UnitBody::PushResult)))
            .unwrap();
        assert_eq!(*replies.lock().unwrap(), vec![UnitType::PushResult]);
        assert_eq!(session.pending_replies(), 0);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_message_dispatch() {
        let (mut session, _transport, recorder) = connected_session();
        let msg = Message {
            timestamp: 1_700_000_000,
            sequence: 42,
            group: "news".into(),
            message: Bytes::from_static(b"breaking"),
        };

        session
            .handle_event(TransportEvent::Frame(unit_frame(
                0,
                UnitBody::Message(msg.clone()),
            )))
            .unwrap();

        assert_eq!(*recorder.messages.lock().unwrap(), vec![msg]);
    }

    #[test]
    fn test_message_outside_session_dropped() {
        let recorder = Recorder::default();
        let mut session: Session<MockTransport, Recorder> = Session::new(recorder.clone());
        let msg = Message {
            timestamp: 1,
            sequence: 1,
            group: "news".into(),
            message: Bytes::new(),
        };

        session
            .handle_event(TransportEvent::Frame(unit_frame(0, UnitBody::Message(msg))))
            .unwrap();

        assert!(recorder.messages.lock().unwrap().is_empty());
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_reply_reported() {
        let (mut session, _transport, recorder) = connected_session();
        let count = Arc::new(AtomicUsize::new(0));
        let id = session.subscribe("news", counting_callback(&count)).unwrap();

        session
            .handle_event(TransportEvent::Frame(unit_frame(
                id,
                UnitBody::Error(ErrorReply {
                    message: "no such group".into(),
                }),
            )))
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let errors = recorder.errors.lock().unwrap();
        match errors.as_slice() {
            [LinkerError::Operation(msg)] => assert!(msg.contains("no such group")),
            other => panic!("expected operation error, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_rejection_reported_while_connecting() {
        let transport = MockTransport::default();
        let recorder = Recorder::default();
        let mut session = Session::new(recorder.clone());
        session.connect(transport, "app1", "tok").unwrap();
        session.handle_event(TransportEvent::Open).unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);

        session
            .handle_event(TransportEvent::Frame(unit_frame(
                0,
                UnitBody::Error(ErrorReply {
                    message: "denied".into(),
                }),
            )))
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.session_token().is_none());
        let errors = recorder.errors.lock().unwrap();
        match errors.as_slice() {
            [LinkerError::Operation(msg)] => assert!(msg.contains("denied")),
            other => panic!("expected one operation error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_error_is_ack() {
        let (mut session, _transport, recorder) = connected_session();
        let count = Arc::new(AtomicUsize::new(0));
        let id = session.subscribe("news", counting_callback(&count)).unwrap();

        session
            .handle_event(TransportEvent::Frame(unit_frame(
                id,
                UnitBody::Error(ErrorReply {
                    message: String::new(),
                }),
            )))
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_frame_reported() {
        let (mut session, _transport, recorder) = connected_session();

        session
            .handle_event(TransportEvent::Frame(Bytes::from_static(&[0x00, 0x09])))
            .unwrap();
        session
            .handle_event(TransportEvent::Frame(Bytes::from_static(&[
                0x00, 0x63, 0, 0, 0, 1,
            ])))
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Connected);
        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, LinkerError::Protocol(_))));
    }

    #[test]
    fn test_default_handler_makes_errors_fatal() {
        let mut session: Session<MockTransport, DefaultHandler> = Session::new(DefaultHandler);

        let result = session.handle_event(TransportEvent::Frame(Bytes::from_static(&[0x00])));
        assert!(matches!(result, Err(LinkerError::Protocol(_))));
    }

    #[test]
    fn test_close_resets_session() {
        let (mut session, transport, recorder) = connected_session();
        let count = Arc::new(AtomicUsize::new(0));
        session.subscribe("news", counting_callback(&count)).unwrap();
        session.subscribe("sports", counting_callback(&count)).unwrap();

        session.close().unwrap();
        assert_eq!(transport.closed(), 1);
        // Still live until the transport confirms
        assert_eq!(session.state(), ConnectionState::Connected);

        session
            .handle_event(TransportEvent::Closed { reason: None })
            .unwrap();

        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.session_token().is_none());
        assert!(session.namespace().is_none());
        assert_eq!(session.cursor(), 0);
        assert_eq!(session.pending_replies(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.events().last().map(String::as_str), Some("closed"));
    }

    #[test]
    fn test_close_without_transport() {
        let mut session: Session<MockTransport, DefaultHandler> = Session::new(DefaultHandler);
        assert!(session.close().is_ok());
    }

    #[test]
    fn test_reconnect_after_close() {
        let (mut session, _transport, _recorder) = connected_session();
        session.subscribe("news", None).unwrap();
        session
            .handle_event(TransportEvent::Closed {
                reason: Some("reset by peer".into()),
            })
            .unwrap();

        let transport = MockTransport::default();
        session.connect(transport.clone(), "app2", "tok").unwrap();
        session.handle_event(TransportEvent::Open).unwrap();
        session
            .handle_event(TransportEvent::Frame(connected_frame("", &[0x07])))
            .unwrap();

        assert_eq!(session.namespace(), Some("app2"));
        assert_eq!(session.cursor(), 1);
        assert_eq!(session.subscribe("news", None).unwrap(), 1);
    }
}
