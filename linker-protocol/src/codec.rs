//! Unit encoding and decoding
//!
//! Frame layout (all integers big-endian):
//!
//! ```text
//! +-----------+------------+----------...----------+
//! | unit type | request id |         body          |
//! |  2 bytes  |  4 bytes   | length-prefixed fields |
//! +-----------+------------+----------...----------+
//! ```
//!
//! Body layouts:
//!
//! ```text
//! Connect    [kind:u8][nsLen:u16][credLen:u16][namespace][credential]
//! Sub        [op:u8][nsLen:u16][sessionLen:u16][groupLen:u16][namespace][session][group]
//! Push       [nsLen:u16][sessionLen:u16][msgCount:u16][namespace][session]
//!            then per message [groupLen:u16][dataLen:u16][group][data]
//! Message    [timestamp:u64][sequence:u32][groupLen:u16][msgLen:u32][group][message]
//! Error      [msgLen:u8][message]
//! Connected  [authErrLen:u8][sessionLen:u16][authError][session]
//! others     no body
//! ```
//!
//! The transport delivers whole frames, so there is no frame delimiter.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PartialFields, ProtocolError, ProtocolErrorKind};
use crate::messages::{
    ConnectRequest, ConnectedReply, ErrorReply, Message, ProtocolUnit, PushMessage, PushRequest,
    SubscriptionRequest, UnitBody,
};
use crate::types::{ConnectKind, SubscribeOp, UnitType};
use crate::{CONNECT_REQUEST_ID, HEADER_SIZE};

const CONNECT_FIXED: usize = 5;
const SUB_FIXED: usize = 7;
const PUSH_FIXED: usize = 6;
const PUSH_MESSAGE_FIXED: usize = 4;
const MESSAGE_FIXED: usize = 18;
const ERROR_FIXED: usize = 1;
const CONNECTED_FIXED: usize = 3;

/// Encode the connect handshake (request id 0, basic authentication)
pub fn encode_connect_request(namespace: &str, credential: &str) -> Result<Bytes, ProtocolError> {
    let mut dst = header(
        UnitType::Connect,
        CONNECT_REQUEST_ID,
        CONNECT_FIXED + namespace.len() + credential.len(),
    );
    put_connect(&mut dst, ConnectKind::Basic, namespace, credential)?;
    Ok(dst.freeze())
}

/// Encode a subscribe or unsubscribe request
pub fn encode_subscription(
    session: &[u8],
    request_id: u32,
    namespace: &str,
    group: &str,
    op: SubscribeOp,
) -> Result<Bytes, ProtocolError> {
    let mut dst = header(
        UnitType::Sub,
        request_id,
        SUB_FIXED + namespace.len() + session.len() + group.len(),
    );
    put_subscription(&mut dst, op, namespace, session, group)?;
    Ok(dst.freeze())
}

/// Encode a push request carrying one or more messages
pub fn encode_push_request(
    session: &[u8],
    request_id: u32,
    namespace: &str,
    messages: &[PushMessage],
) -> Result<Bytes, ProtocolError> {
    let mut dst = header(
        UnitType::Push,
        request_id,
        push_body_len(namespace, session, messages),
    );
    put_push(&mut dst, namespace, session, messages)?;
    Ok(dst.freeze())
}

/// Decode one complete frame
pub fn decode(buf: &[u8]) -> Result<ProtocolUnit, ProtocolError> {
    let mut reader = Reader::new(buf);
    decode_unit(&mut reader).map_err(|kind| {
        ProtocolError::new(kind)
            .with_raw(Bytes::copy_from_slice(buf))
            .with_partial(reader.partial)
    })
}

impl ProtocolUnit {
    /// Exact encoded size of this unit, header included
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + body_len(&self.body)
    }

    /// Encode this unit into a frame
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut dst = header(self.unit_type(), self.request_id, body_len(&self.body));
        match &self.body {
            UnitBody::Dummy | UnitBody::Response | UnitBody::Keepalive | UnitBody::PushResult => {}
            UnitBody::Connect(req) => {
                put_connect(&mut dst, req.kind, &req.namespace, &req.credential)?
            }
            UnitBody::Subscription(req) => {
                put_subscription(&mut dst, req.op, &req.namespace, &req.session, &req.group)?
            }
            UnitBody::Push(req) => put_push(&mut dst, &req.namespace, &req.session, &req.messages)?,
            UnitBody::Connected(reply) => {
                let auth_error = reply.auth_error.as_bytes();
                dst.put_u8(len_u8("auth_error", auth_error.len())?);
                dst.put_u16(len_u16("session", reply.session.len())?);
                dst.put_slice(auth_error);
                dst.put_slice(&reply.session);
            }
            UnitBody::Error(reply) => {
                let message = reply.message.as_bytes();
                dst.put_u8(len_u8("message", message.len())?);
                dst.put_slice(message);
            }
            UnitBody::Message(msg) => {
                dst.put_u64(msg.timestamp);
                dst.put_u32(msg.sequence);
                dst.put_u16(len_u16("group", msg.group.len())?);
                dst.put_u32(len_u32("message", msg.message.len())?);
                dst.put_slice(msg.group.as_bytes());
                dst.put_slice(&msg.message);
            }
        }
        Ok(dst.freeze())
    }
}

fn header(unit_type: UnitType, request_id: u32, body_len: usize) -> BytesMut {
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + body_len);
    dst.put_u16(unit_type.code());
    dst.put_u32(request_id);
    dst
}

fn body_len(body: &UnitBody) -> usize {
    match body {
        UnitBody::Dummy | UnitBody::Response | UnitBody::Keepalive | UnitBody::PushResult => 0,
        UnitBody::Connect(req) => CONNECT_FIXED + req.namespace.len() + req.credential.len(),
        UnitBody::Subscription(req) => {
            SUB_FIXED + req.namespace.len() + req.session.len() + req.group.len()
        }
        UnitBody::Push(req) => push_body_len(&req.namespace, &req.session, &req.messages),
        UnitBody::Connected(reply) => {
            CONNECTED_FIXED + reply.auth_error.len() + reply.session.len()
        }
        UnitBody::Error(reply) => ERROR_FIXED + reply.message.len(),
        UnitBody::Message(msg) => MESSAGE_FIXED + msg.group.len() + msg.message.len(),
    }
}

fn push_body_len(namespace: &str, session: &[u8], messages: &[PushMessage]) -> usize {
    PUSH_FIXED
        + namespace.len()
        + session.len()
        + messages
            .iter()
            .map(|m| PUSH_MESSAGE_FIXED + m.group.len() + m.data.len())
            .sum::<usize>()
}

fn put_connect(
    dst: &mut BytesMut,
    kind: ConnectKind,
    namespace: &str,
    credential: &str,
) -> Result<(), ProtocolError> {
    dst.put_u8(kind as u8);
    dst.put_u16(len_u16("namespace", namespace.len())?);
    dst.put_u16(len_u16("credential", credential.len())?);
    dst.put_slice(namespace.as_bytes());
    dst.put_slice(credential.as_bytes());
    Ok(())
}

fn put_subscription(
    dst: &mut BytesMut,
    op: SubscribeOp,
    namespace: &str,
    session: &[u8],
    group: &str,
) -> Result<(), ProtocolError> {
    dst.put_u8(op as u8);
    dst.put_u16(len_u16("namespace", namespace.len())?);
    dst.put_u16(len_u16("session", session.len())?);
    dst.put_u16(len_u16("group", group.len())?);
    dst.put_slice(namespace.as_bytes());
    dst.put_slice(session);
    dst.put_slice(group.as_bytes());
    Ok(())
}

fn put_push(
    dst: &mut BytesMut,
    namespace: &str,
    session: &[u8],
    messages: &[PushMessage],
) -> Result<(), ProtocolError> {
    dst.put_u16(len_u16("namespace", namespace.len())?);
    dst.put_u16(len_u16("session", session.len())?);
    dst.put_u16(len_u16("msg_count", messages.len())?);
    dst.put_slice(namespace.as_bytes());
    dst.put_slice(session);
    for msg in messages {
        dst.put_u16(len_u16("group", msg.group.len())?);
        dst.put_u16(len_u16("data", msg.data.len())?);
        dst.put_slice(msg.group.as_bytes());
        dst.put_slice(&msg.data);
    }
    Ok(())
}

fn len_u8(field: &'static str, len: usize) -> Result<u8, ProtocolError> {
    u8::try_from(len).map_err(|_| ProtocolError::field_too_long(field, len, u8::MAX as usize))
}

fn len_u16(field: &'static str, len: usize) -> Result<u16, ProtocolError> {
    u16::try_from(len).map_err(|_| ProtocolError::field_too_long(field, len, u16::MAX as usize))
}

fn len_u32(field: &'static str, len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::field_too_long(field, len, u32::MAX as usize))
}

/// Cursor over a frame that records what it has read
struct Reader<'a> {
    buf: &'a [u8],
    partial: PartialFields,
}

type ReadResult<T> = Result<T, ProtocolErrorKind>;

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            partial: PartialFields::default(),
        }
    }

    /// Require `n` bytes of fixed-size fields
    fn need(&self, n: usize) -> ReadResult<()> {
        if self.buf.remaining() < n {
            return Err(ProtocolErrorKind::TooShort {
                needed: n,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn len_u8(&mut self, field: &'static str) -> usize {
        let len = self.buf.get_u8() as usize;
        self.partial.lengths.push((field, len));
        len
    }

    fn len_u16(&mut self, field: &'static str) -> usize {
        let len = self.buf.get_u16() as usize;
        self.partial.lengths.push((field, len));
        len
    }

    fn len_u32(&mut self, field: &'static str) -> usize {
        let len = self.buf.get_u32() as usize;
        self.partial.lengths.push((field, len));
        len
    }

    fn bytes(&mut self, field: &'static str, len: usize) -> ReadResult<Bytes> {
        if self.buf.remaining() < len {
            return Err(ProtocolErrorKind::LengthOverrun {
                field,
                declared: len,
                available: self.buf.remaining(),
            });
        }
        Ok(self.buf.copy_to_bytes(len))
    }

    fn string(&mut self, field: &'static str, len: usize) -> ReadResult<String> {
        let raw = self.bytes(field, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolErrorKind::InvalidUtf8 { field })
    }

    /// Check that every declared length fits before reading any payload,
    /// so the reported overrun names the total rather than a single field
    fn fits(&self, declared: usize) -> ReadResult<()> {
        if self.buf.remaining() < declared {
            return Err(ProtocolErrorKind::LengthOverrun {
                field: "body",
                declared,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }
}

fn decode_unit(r: &mut Reader<'_>) -> ReadResult<ProtocolUnit> {
    r.need(HEADER_SIZE)?;
    let code = r.buf.get_u16();
    r.partial.unit_type = Some(code);
    let request_id = r.buf.get_u32();
    r.partial.request_id = Some(request_id);

    let unit_type = UnitType::try_from(code).map_err(ProtocolErrorKind::UnknownUnitType)?;
    let body = match unit_type {
        UnitType::Dummy => UnitBody::Dummy,
        UnitType::Response => UnitBody::Response,
        UnitType::Keepalive => UnitBody::Keepalive,
        UnitType::PushResult => UnitBody::PushResult,
        UnitType::Connect => UnitBody::Connect(decode_connect(r)?),
        UnitType::Sub => UnitBody::Subscription(decode_subscription(r)?),
        UnitType::Push => UnitBody::Push(decode_push(r)?),
        UnitType::Message => UnitBody::Message(decode_message(r)?),
        UnitType::Error => UnitBody::Error(decode_error(r)?),
        UnitType::Connected => UnitBody::Connected(decode_connected(r)?),
    };
    Ok(ProtocolUnit::new(request_id, body))
}

fn decode_connect(r: &mut Reader<'_>) -> ReadResult<ConnectRequest> {
    r.need(CONNECT_FIXED)?;
    let raw_kind = r.buf.get_u8();
    let kind = ConnectKind::try_from(raw_kind).map_err(ProtocolErrorKind::InvalidConnectKind)?;
    let ns_len = r.len_u16("namespace");
    let cred_len = r.len_u16("credential");
    r.fits(ns_len + cred_len)?;
    Ok(ConnectRequest {
        kind,
        namespace: r.string("namespace", ns_len)?,
        credential: r.string("credential", cred_len)?,
    })
}

fn decode_subscription(r: &mut Reader<'_>) -> ReadResult<SubscriptionRequest> {
    r.need(SUB_FIXED)?;
    let raw_op = r.buf.get_u8();
    let op = SubscribeOp::try_from(raw_op).map_err(ProtocolErrorKind::InvalidSubscribeOp)?;
    let ns_len = r.len_u16("namespace");
    let session_len = r.len_u16("session");
    let group_len = r.len_u16("group");
    r.fits(ns_len + session_len + group_len)?;
    Ok(SubscriptionRequest {
        op,
        namespace: r.string("namespace", ns_len)?,
        session: r.bytes("session", session_len)?,
        group: r.string("group", group_len)?,
    })
}

fn decode_push(r: &mut Reader<'_>) -> ReadResult<PushRequest> {
    r.need(PUSH_FIXED)?;
    let ns_len = r.len_u16("namespace");
    let session_len = r.len_u16("session");
    let count = r.len_u16("msg_count");
    r.fits(ns_len + session_len)?;
    let namespace = r.string("namespace", ns_len)?;
    let session = r.bytes("session", session_len)?;

    // Capped by what the rest of the body could hold
    let mut messages = Vec::with_capacity(count.min(r.buf.remaining() / PUSH_MESSAGE_FIXED));
    for _ in 0..count {
        r.need(PUSH_MESSAGE_FIXED)?;
        let group_len = r.len_u16("group");
        let data_len = r.len_u16("data");
        r.fits(group_len + data_len)?;
        messages.push(PushMessage {
            group: r.string("group", group_len)?,
            data: r.bytes("data", data_len)?,
        });
    }
    Ok(PushRequest {
        namespace,
        session,
        messages,
    })
}

fn decode_message(r: &mut Reader<'_>) -> ReadResult<Message> {
    r.need(MESSAGE_FIXED)?;
    let timestamp = r.buf.get_u64();
    let sequence = r.buf.get_u32();
    let group_len = r.len_u16("group");
    let msg_len = r.len_u32("message");
    r.fits(group_len + msg_len)?;
    Ok(Message {
        timestamp,
        sequence,
        group: r.string("group", group_len)?,
        message: r.bytes("message", msg_len)?,
    })
}

fn decode_error(r: &mut Reader<'_>) -> ReadResult<ErrorReply> {
    // A bare header is an acknowledgement with no message
    if r.buf.is_empty() {
        return Ok(ErrorReply {
            message: String::new(),
        });
    }
    let msg_len = r.len_u8("message");
    Ok(ErrorReply {
        message: r.string("message", msg_len)?,
    })
}

fn decode_connected(r: &mut Reader<'_>) -> ReadResult<ConnectedReply> {
    r.need(CONNECTED_FIXED)?;
    let auth_len = r.len_u8("auth_error");
    let session_len = r.len_u16("session");
    r.fits(auth_len + session_len)?;
    Ok(ConnectedReply {
        auth_error: r.string("auth_error", auth_len)?,
        session: r.bytes("session", session_len)?,
    })
}
