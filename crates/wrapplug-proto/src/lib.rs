//! Wire protocol for the wrapplug plugin channel.
//!
//! Every RPC is a single request [`Frame`] answered by a single reply frame on
//! its own QUIC stream. A frame is a fixed 16-byte binary header followed by a
//! CBOR payload. The header carries the [`Opcode`], which identifies both the
//! payload type and the service that owns it.
//!
//! ```text
//! [magic:4][version:1][reserved:1][opcode:2][request_id:4][payload_size:4]
//! [payload: payload_size bytes of CBOR]
//! ```
//!
//! The first request on every connection is a [`payloads::session::Hello`].
//! Service requests are only dispatched after the hello has been accepted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::{Opcode, ServiceKind};
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier negotiated during the TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"wrapplug";
