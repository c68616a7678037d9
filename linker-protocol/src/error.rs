//! Protocol error taxonomy
//!
//! A [`ProtocolError`] keeps the offending frame and whatever was decoded
//! before the failure, so a handler can log something more useful than
//! "bad frame".

use bytes::Bytes;

/// What went wrong while encoding or decoding a unit
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolErrorKind {
    #[error("Unit too short: need {needed} bytes, have {available}")]
    TooShort { needed: usize, available: usize },

    #[error("Invalid unit type {0}")]
    UnknownUnitType(u16),

    #[error("Declared {field} length {declared} exceeds remaining {available} bytes")]
    LengthOverrun {
        field: &'static str,
        declared: usize,
        available: usize,
    },

    #[error("Field {field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("Invalid connect kind {0}")]
    InvalidConnectKind(u8),

    #[error("Invalid subscribe op {0}")]
    InvalidSubscribeOp(u8),

    #[error("Field {field} too long: {len} (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Duplicated connecting reply")]
    UnexpectedConnected,
}

/// Fields decoded before a failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFields {
    pub unit_type: Option<u16>,
    pub request_id: Option<u32>,
    /// Length prefixes read so far, in wire order
    pub lengths: Vec<(&'static str, usize)>,
}

/// Malformed frame, or a unit that arrived out of sequence
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    /// The raw frame, empty for encode-side failures
    pub raw: Bytes,
    pub partial: PartialFields,
}

impl ProtocolError {
    /// Create an error without diagnostics attached
    pub fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            raw: Bytes::new(),
            partial: PartialFields::default(),
        }
    }

    /// Attach the raw frame
    pub fn with_raw(mut self, raw: Bytes) -> Self {
        self.raw = raw;
        self
    }

    /// Attach partially decoded fields
    pub fn with_partial(mut self, partial: PartialFields) -> Self {
        self.partial = partial;
        self
    }

    /// A length field cannot represent `len`
    pub fn field_too_long(field: &'static str, len: usize, max: usize) -> Self {
        Self::new(ProtocolErrorKind::FieldTooLong { field, len, max })
    }

    /// A Connected reply arrived while no handshake was in flight
    pub fn unexpected_connected(raw: Bytes, request_id: u32) -> Self {
        Self::new(ProtocolErrorKind::UnexpectedConnected)
            .with_raw(raw)
            .with_partial(PartialFields {
                unit_type: Some(crate::UnitType::Connected.code()),
                request_id: Some(request_id),
                lengths: Vec::new(),
            })
    }
}
