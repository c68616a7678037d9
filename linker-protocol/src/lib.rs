//! linker-protocol: Binary wire protocol for Linker-IM
//!
//! This crate defines the protocol units exchanged between a Linker-IM
//! client and the broker, and the pure functions that turn them into
//! frames and back. Every frame starts with a 6-byte header
//! (`[unit type: u16][request id: u32]`, big-endian) followed by a body
//! made of self-describing length-prefixed fields.

pub mod codec;
pub mod error;
pub mod framing;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{decode, encode_connect_request, encode_push_request, encode_subscription};
pub use error::{PartialFields, ProtocolError, ProtocolErrorKind};
pub use framing::{CodecError, FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use messages::{
    ConnectRequest, ConnectedReply, ErrorReply, Message, ProtocolUnit, PushMessage, PushRequest,
    SubscriptionRequest, UnitBody,
};
pub use types::{ConnectKind, SubscribeOp, UnitType};

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 6;

/// Request id used by the connect handshake
pub const CONNECT_REQUEST_ID: u32 = 0;
