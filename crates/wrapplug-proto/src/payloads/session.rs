//! Session payload types: handshake and errors.

use serde::{Deserialize, Serialize};

/// Connection handshake, always the first request on a connection.
///
/// Every field must match the server's handshake configuration exactly or the
/// connection is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Identity cookie key
    pub cookie_key: String,
    /// Identity cookie value
    pub cookie_value: String,
    /// Application protocol version the client speaks
    pub protocol_version: u32,
    /// Service name the client expects to dispense
    pub service_name: String,
}

/// Handshake accepted.
///
/// Advertises the services the server registered, so the client can compose
/// a proxy that never exceeds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Negotiated protocol version
    pub protocol_version: u32,
    /// Names of every registered service (see `ServiceKind::name`)
    pub services: Vec<String>,
}
