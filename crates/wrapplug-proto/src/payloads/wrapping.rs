//! Wrapping service payload types.
//!
//! [`WrapOptions`], [`BlobInfo`] and [`KeyInfo`] double as the domain types
//! for wrapper implementations, so a blob produced by a local wrapper and one
//! returned across the wire are the same value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-call options passed through to the wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapOptions {
    /// Key id to use instead of the wrapper's current key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Additional authenticated data bound to the ciphertext
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub aad: Option<Vec<u8>>,

    /// Backend-specific configuration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

impl WrapOptions {
    /// Options binding additional authenticated data.
    #[must_use]
    pub fn with_aad(aad: impl Into<Vec<u8>>) -> Self {
        Self { aad: Some(aad.into()), ..Self::default() }
    }
}

/// Identifies the key a blob was wrapped under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Key id at wrap time
    pub key_id: String,
    /// Backend-specific mechanism identifier
    #[serde(default)]
    pub mechanism: u64,
}

/// Result of a wrap: ciphertext plus everything needed to unwrap it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Ciphertext including any authentication tag
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,

    /// Nonce / initialization vector
    #[serde(default, with = "serde_bytes")]
    pub iv: Vec<u8>,

    /// Key that produced the ciphertext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,
}

/// Wrap request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapRequest {
    /// Data to wrap
    #[serde(with = "serde_bytes")]
    pub plaintext: Vec<u8>,
    /// Wrap options
    #[serde(default)]
    pub options: WrapOptions,
    /// Caller deadline in milliseconds, enforced by the server too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Unwrap request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwrapRequest {
    /// Blob returned by an earlier wrap
    pub blob: BlobInfo,
    /// Unwrap options
    #[serde(default)]
    pub options: WrapOptions,
    /// Caller deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Unwrap reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwrapReply {
    /// Recovered plaintext
    #[serde(with = "serde_bytes")]
    pub plaintext: Vec<u8>,
}

/// Request carrying no arguments besides the deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Caller deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Key id reply, shared by the wrapping and HMAC services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyIdReply {
    /// Key id
    pub key_id: String,
}
