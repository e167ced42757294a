//! HMAC service payload types.

use serde::{Deserialize, Serialize};

/// Compute an HMAC over `data` with the backend's HMAC key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeHmacRequest {
    /// Data to authenticate
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Caller deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// HMAC digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeHmacReply {
    /// Digest bytes
    #[serde(with = "serde_bytes")]
    pub digest: Vec<u8>,
}
