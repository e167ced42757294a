//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, payloads use CBOR for type safety and forward
//! compatibility. The `Payload` enum covers every message: the session
//! handshake, the three services, and error replies.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values.

pub mod hmac;
pub mod lifecycle;
pub mod session;
pub mod wrapping;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads
///
/// The payload type is determined by the `Opcode` in the frame header, so only
/// the inner struct content is serialized (no variant tag in CBOR).
///
/// # Security
///
/// - No Variant Tag: the frame header's `opcode` field already identifies the
///   payload type, so a peer cannot send mismatched opcode/payload pairs that
///   decode as something else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session
    /// Connection handshake
    Hello(session::Hello),
    /// Handshake accepted
    HelloReply(session::HelloReply),
    /// Error reply
    Error(ErrorPayload),

    // Wrapping service
    /// Wrap plaintext
    Wrap(wrapping::WrapRequest),
    /// Wrapped blob
    WrapReply(wrapping::BlobInfo),
    /// Unwrap blob
    Unwrap(wrapping::UnwrapRequest),
    /// Recovered plaintext
    UnwrapReply(wrapping::UnwrapReply),
    /// Request key id
    KeyId(wrapping::CallRequest),
    /// Key id
    KeyIdReply(wrapping::KeyIdReply),

    // Init/finalize service
    /// Initialize backend
    Init(lifecycle::LifecycleRequest),
    /// Init acknowledged
    InitReply,
    /// Finalize backend
    Finalize(lifecycle::LifecycleRequest),
    /// Finalize acknowledged
    FinalizeReply,

    // HMAC service
    /// Request HMAC key id
    HmacKeyId(wrapping::CallRequest),
    /// HMAC key id
    HmacKeyIdReply(wrapping::KeyIdReply),
    /// Compute HMAC
    ComputeHmac(hmac::ComputeHmacRequest),
    /// HMAC digest
    ComputeHmacReply(hmac::ComputeHmacReply),
}

/// Error payload for error frames.
///
/// `op` names the operation that failed so the caller can attribute the error
/// without correlating request ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Operation that failed.
    pub op: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Nil wrapper or malformed registration.
    pub const CONFIGURATION: u16 = 0x0001;
    /// Rejected argument.
    pub const INVALID_PARAMETER: u16 = 0x0002;
    /// Transport failure reported by the peer.
    pub const TRANSPORT: u16 = 0x0003;
    /// Capability expectation does not match the registered services.
    pub const CAPABILITY_MISMATCH: u16 = 0x0004;
    /// Failure from the underlying wrapper.
    pub const UPSTREAM: u16 = 0x0005;
    /// Call was cancelled.
    pub const CANCELLED: u16 = 0x0006;
    /// Call deadline passed.
    pub const DEADLINE_EXCEEDED: u16 = 0x0007;
    /// Handshake did not match the server's configuration.
    pub const HANDSHAKE_REJECTED: u16 = 0x0008;
    /// Request targets a service the server did not register.
    pub const UNIMPLEMENTED: u16 = 0x0009;
    /// Payload could not be decoded.
    pub const INVALID_PAYLOAD: u16 = 0x000A;

    /// Create an error payload.
    pub fn new(code: u16, op: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code, op: op.into(), message: message.into() }
    }

    /// Handshake rejected.
    pub fn handshake_rejected(message: impl Into<String>) -> Self {
        Self::new(Self::HANDSHAKE_REJECTED, "hello", message)
    }

    /// Request for an unregistered service.
    pub fn unimplemented(opcode: Opcode) -> Self {
        let message = match opcode.service() {
            Some(service) => format!("service {service} is not registered"),
            None => format!("opcode {:#06x} is not a request", opcode.to_u16()),
        };
        Self::new(Self::UNIMPLEMENTED, opcode.op_name(), message)
    }

    /// Payload could not be decoded.
    pub fn invalid_payload(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PAYLOAD, op, message)
    }
}

fn cbor_encode<T: Serialize>(value: &T, dst: &mut impl BufMut) -> Result<()> {
    ciborium::ser::into_writer(value, dst.writer())
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

fn cbor_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Error(_) => Opcode::Error,
            Self::Wrap(_) => Opcode::Wrap,
            Self::WrapReply(_) => Opcode::WrapReply,
            Self::Unwrap(_) => Opcode::Unwrap,
            Self::UnwrapReply(_) => Opcode::UnwrapReply,
            Self::KeyId(_) => Opcode::KeyId,
            Self::KeyIdReply(_) => Opcode::KeyIdReply,
            Self::Init(_) => Opcode::Init,
            Self::InitReply => Opcode::InitReply,
            Self::Finalize(_) => Opcode::Finalize,
            Self::FinalizeReply => Opcode::FinalizeReply,
            Self::HmacKeyId(_) => Opcode::HmacKeyId,
            Self::HmacKeyIdReply(_) => Opcode::HmacKeyIdReply,
            Self::ComputeHmac(_) => Opcode::ComputeHmac,
            Self::ComputeHmacReply(_) => Opcode::ComputeHmacReply,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner struct, NOT the variant tag. Size limits are
    /// enforced later by [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        match self {
            Self::Hello(inner) => cbor_encode(inner, dst),
            Self::HelloReply(inner) => cbor_encode(inner, dst),
            Self::Error(inner) => cbor_encode(inner, dst),
            Self::Wrap(inner) => cbor_encode(inner, dst),
            Self::WrapReply(inner) => cbor_encode(inner, dst),
            Self::Unwrap(inner) => cbor_encode(inner, dst),
            Self::UnwrapReply(inner) => cbor_encode(inner, dst),
            Self::KeyId(inner) | Self::HmacKeyId(inner) => cbor_encode(inner, dst),
            Self::KeyIdReply(inner) | Self::HmacKeyIdReply(inner) => cbor_encode(inner, dst),
            Self::Init(inner) | Self::Finalize(inner) => cbor_encode(inner, dst),
            Self::InitReply | Self::FinalizeReply => Ok(()), // Zero-byte payloads
            Self::ComputeHmac(inner) => cbor_encode(inner, dst),
            Self::ComputeHmacReply(inner) => cbor_encode(inner, dst),
        }
    }

    /// Decode payload from bytes based on opcode
    ///
    /// The size check happens before CBOR parsing begins.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(cbor_decode(bytes)?),
            Opcode::HelloReply => Self::HelloReply(cbor_decode(bytes)?),
            Opcode::Error => Self::Error(cbor_decode(bytes)?),
            Opcode::Wrap => Self::Wrap(cbor_decode(bytes)?),
            Opcode::WrapReply => Self::WrapReply(cbor_decode(bytes)?),
            Opcode::Unwrap => Self::Unwrap(cbor_decode(bytes)?),
            Opcode::UnwrapReply => Self::UnwrapReply(cbor_decode(bytes)?),
            Opcode::KeyId => Self::KeyId(cbor_decode(bytes)?),
            Opcode::KeyIdReply => Self::KeyIdReply(cbor_decode(bytes)?),
            Opcode::Init => Self::Init(cbor_decode(bytes)?),
            Opcode::InitReply => Self::InitReply,
            Opcode::Finalize => Self::Finalize(cbor_decode(bytes)?),
            Opcode::FinalizeReply => Self::FinalizeReply,
            Opcode::HmacKeyId => Self::HmacKeyId(cbor_decode(bytes)?),
            Opcode::HmacKeyIdReply => Self::HmacKeyIdReply(cbor_decode(bytes)?),
            Opcode::ComputeHmac => Self::ComputeHmac(cbor_decode(bytes)?),
            Opcode::ComputeHmacReply => Self::ComputeHmacReply(cbor_decode(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame with the given request id.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, request_id: u32) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        let mut header = FrameHeader::new(self.opcode());
        header.set_request_id(request_id);
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the opcode is not recognized
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
