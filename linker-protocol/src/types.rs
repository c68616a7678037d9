//! Wire-level enumerations

use std::fmt;

/// Kind of a protocol unit, carried in the first two bytes of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum UnitType {
    Dummy = 0,
    Response = 1,
    Connect = 2,
    Sub = 3,
    Keepalive = 4,
    Push = 5,
    Message = 6,
    Error = 7,
    Connected = 8,
    PushResult = 9,
}

impl UnitType {
    /// Wire code of this unit type
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for UnitType {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, u16> {
        Ok(match code {
            0 => Self::Dummy,
            1 => Self::Response,
            2 => Self::Connect,
            3 => Self::Sub,
            4 => Self::Keepalive,
            5 => Self::Push,
            6 => Self::Message,
            7 => Self::Error,
            8 => Self::Connected,
            9 => Self::PushResult,
            other => return Err(other),
        })
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Authentication scheme of a connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectKind {
    /// Resume with an existing session token
    Session = 0,
    /// Namespace + credential
    #[default]
    Basic = 1,
}

impl TryFrom<u8> for ConnectKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Self::Session),
            1 => Ok(Self::Basic),
            other => Err(other),
        }
    }
}

/// Direction of a subscription change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscribeOp {
    Sub = 0,
    Unsub = 1,
}

impl TryFrom<u8> for SubscribeOp {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Self::Sub),
            1 => Ok(Self::Unsub),
            other => Err(other),
        }
    }
}
