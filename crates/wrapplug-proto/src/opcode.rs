//! Operation codes and the services that own them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Service a request opcode belongs to.
///
/// `Wrapping` is always registered by a server. The other two are optional and
/// only registered when the backend wrapper implements them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Mandatory wrap/unwrap/key-id service
    Wrapping,
    /// Optional init/finalize lifecycle service
    InitFinalize,
    /// Optional HMAC service
    HmacComputer,
}

impl ServiceKind {
    /// All services, mandatory first.
    pub const ALL: [Self; 3] = [Self::Wrapping, Self::InitFinalize, Self::HmacComputer];

    /// Stable name used in handshake advertisements and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wrapping => "wrapping",
            Self::InitFinalize => "init_finalize",
            Self::HmacComputer => "hmac_computer",
        }
    }

    /// Parse a service from its advertised name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame operation code.
///
/// Requests and replies come in pairs; a reply opcode is always its request
/// opcode plus one. The high byte groups opcodes by service:
///
/// - `0x00xx`: session (hello, error)
/// - `0x01xx`: wrapping
/// - `0x02xx`: init/finalize
/// - `0x03xx`: HMAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Connection handshake
    Hello = 0x0001,
    /// Handshake accepted
    HelloReply = 0x0002,
    /// Error reply to any request
    Error = 0x0003,

    /// Wrap plaintext
    Wrap = 0x0100,
    /// Wrapped blob
    WrapReply = 0x0101,
    /// Unwrap blob
    Unwrap = 0x0102,
    /// Recovered plaintext
    UnwrapReply = 0x0103,
    /// Request current key id
    KeyId = 0x0104,
    /// Current key id
    KeyIdReply = 0x0105,

    /// Initialize backend resources
    Init = 0x0200,
    /// Init acknowledged
    InitReply = 0x0201,
    /// Release backend resources
    Finalize = 0x0202,
    /// Finalize acknowledged
    FinalizeReply = 0x0203,

    /// Request HMAC key id
    HmacKeyId = 0x0300,
    /// HMAC key id
    HmacKeyIdReply = 0x0301,
    /// Compute HMAC over data
    ComputeHmac = 0x0302,
    /// HMAC digest
    ComputeHmacReply = 0x0303,
}

impl Opcode {
    /// Every opcode, in wire order.
    pub const ALL: [Self; 17] = [
        Self::Hello,
        Self::HelloReply,
        Self::Error,
        Self::Wrap,
        Self::WrapReply,
        Self::Unwrap,
        Self::UnwrapReply,
        Self::KeyId,
        Self::KeyIdReply,
        Self::Init,
        Self::InitReply,
        Self::Finalize,
        Self::FinalizeReply,
        Self::HmacKeyId,
        Self::HmacKeyIdReply,
        Self::ComputeHmac,
        Self::ComputeHmacReply,
    ];

    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unknown.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.to_u16() == value)
    }

    /// Service that handles this request opcode.
    ///
    /// `None` for session opcodes and for replies.
    #[must_use]
    pub const fn service(self) -> Option<ServiceKind> {
        match self {
            Self::Wrap | Self::Unwrap | Self::KeyId => Some(ServiceKind::Wrapping),
            Self::Init | Self::Finalize => Some(ServiceKind::InitFinalize),
            Self::HmacKeyId | Self::ComputeHmac => Some(ServiceKind::HmacComputer),
            _ => None,
        }
    }

    /// Expected success reply for a request opcode.
    #[must_use]
    pub const fn reply(self) -> Option<Self> {
        match self {
            Self::Hello => Some(Self::HelloReply),
            Self::Wrap => Some(Self::WrapReply),
            Self::Unwrap => Some(Self::UnwrapReply),
            Self::KeyId => Some(Self::KeyIdReply),
            Self::Init => Some(Self::InitReply),
            Self::Finalize => Some(Self::FinalizeReply),
            Self::HmacKeyId => Some(Self::HmacKeyIdReply),
            Self::ComputeHmac => Some(Self::ComputeHmacReply),
            _ => None,
        }
    }

    /// Operation name used in error reports.
    #[must_use]
    pub const fn op_name(self) -> &'static str {
        match self {
            Self::Hello | Self::HelloReply => "hello",
            Self::Error => "error",
            Self::Wrap | Self::WrapReply => "wrap",
            Self::Unwrap | Self::UnwrapReply => "unwrap",
            Self::KeyId | Self::KeyIdReply => "key_id",
            Self::Init | Self::InitReply => "init",
            Self::Finalize | Self::FinalizeReply => "finalize",
            Self::HmacKeyId | Self::HmacKeyIdReply => "hmac_key_id",
            Self::ComputeHmac | Self::ComputeHmacReply => "compute_hmac",
        }
    }
}
