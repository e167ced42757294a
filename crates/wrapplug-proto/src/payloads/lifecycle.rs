//! Init/finalize service payload types.

use serde::{Deserialize, Serialize};

use super::wrapping::WrapOptions;

/// Init or finalize request.
///
/// The replies carry no payload; success is the reply opcode itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRequest {
    /// Options for the lifecycle hook
    #[serde(default)]
    pub options: WrapOptions,
    /// Caller deadline in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}
