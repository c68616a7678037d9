//! Protocol unit records
//!
//! Client-to-broker requests and broker-to-client replies share one
//! [`ProtocolUnit`] type. The unit type is derived from the body, so a
//! unit can never claim one type and carry another's payload.

use bytes::Bytes;

use crate::types::{ConnectKind, SubscribeOp, UnitType};

/// Connect request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub kind: ConnectKind,
    pub namespace: String,
    pub credential: String,
}

/// Subscribe / unsubscribe request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub op: SubscribeOp,
    pub namespace: String,
    pub session: Bytes,
    pub group: String,
}

/// One message inside a push request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub group: String,
    pub data: Bytes,
}

impl PushMessage {
    pub fn new(group: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            group: group.into(),
            data: data.into(),
        }
    }
}

/// Push request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub namespace: String,
    pub session: Bytes,
    pub messages: Vec<PushMessage>,
}

/// Reply to the connect handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedReply {
    /// Empty on success
    pub auth_error: String,
    pub session: Bytes,
}

impl ConnectedReply {
    pub fn is_authenticated(&self) -> bool {
        self.auth_error.is_empty()
    }
}

/// Error reply; an empty message acknowledges the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub message: String,
}

impl ErrorReply {
    pub fn is_success(&self) -> bool {
        self.message.is_empty()
    }
}

/// A message delivered to a subscribed group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Broker timestamp
    pub timestamp: u64,
    /// Sequence within the timestamp
    pub sequence: u32,
    pub group: String,
    pub message: Bytes,
}

/// Unit payload, one variant per unit type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitBody {
    Dummy,
    Response,
    Keepalive,
    PushResult,
    Connect(ConnectRequest),
    Subscription(SubscriptionRequest),
    Push(PushRequest),
    Connected(ConnectedReply),
    Error(ErrorReply),
    Message(Message),
}

impl UnitBody {
    pub fn unit_type(&self) -> UnitType {
        match self {
            Self::Dummy => UnitType::Dummy,
            Self::Response => UnitType::Response,
            Self::Keepalive => UnitType::Keepalive,
            Self::PushResult => UnitType::PushResult,
            Self::Connect(_) => UnitType::Connect,
            Self::Subscription(_) => UnitType::Sub,
            Self::Push(_) => UnitType::Push,
            Self::Connected(_) => UnitType::Connected,
            Self::Error(_) => UnitType::Error,
            Self::Message(_) => UnitType::Message,
        }
    }
}

/// One frame: header fields plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolUnit {
    pub request_id: u32,
    pub body: UnitBody,
}

impl ProtocolUnit {
    pub fn new(request_id: u32, body: UnitBody) -> Self {
        Self { request_id, body }
    }

    pub fn unit_type(&self) -> UnitType {
        self.body.unit_type()
    }
}
