//! Error taxonomy shared by wrappers, the server adapter and client proxies.
//!
//! Every variant names the operation that failed (`op`), so an error that
//! crossed the RPC boundary still says where it came from. Errors travel as
//! [`ErrorPayload`] and are rebuilt into the same variant on the other side.

use thiserror::Error;
use wrapplug_proto::ErrorPayload;

use crate::CapabilitySet;

/// Errors surfaced by wrapper operations, locally or over RPC.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WrapperError {
    /// Invalid construction input or malformed service registration
    #[error("{op}: configuration error: {message}")]
    Configuration {
        /// Failing operation
        op: String,
        /// What was wrong
        message: String,
    },

    /// Caller supplied an invalid argument
    #[error("{op}: invalid parameter: {message}")]
    InvalidParameter {
        /// Failing operation
        op: String,
        /// What was wrong
        message: String,
    },

    /// Channel failure, handshake rejection or peer death
    #[error("{op}: transport error: {message}")]
    Transport {
        /// Failing operation
        op: String,
        /// Underlying failure
        message: String,
    },

    /// Server advertised a capability set other than the one expected
    #[error("{op}: capability mismatch: expected {expected}, server offers {actual}")]
    CapabilityMismatch {
        /// Failing operation
        op: String,
        /// Set the caller expected
        expected: CapabilitySet,
        /// Set the server advertised
        actual: CapabilitySet,
    },

    /// Error reported by the concrete wrapper
    #[error("{op}: {message}")]
    Upstream {
        /// Failing operation
        op: String,
        /// Wrapper's message
        message: String,
    },

    /// Call cancelled through its context
    #[error("{op}: cancelled")]
    Cancelled {
        /// Failing operation
        op: String,
    },

    /// Call deadline passed before completion
    #[error("{op}: deadline exceeded")]
    DeadlineExceeded {
        /// Failing operation
        op: String,
    },
}

impl WrapperError {
    /// Build a [`WrapperError::Configuration`].
    pub fn configuration(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration { op: op.into(), message: message.into() }
    }

    /// Build a [`WrapperError::InvalidParameter`].
    pub fn invalid_parameter(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter { op: op.into(), message: message.into() }
    }

    /// Build a [`WrapperError::Transport`].
    pub fn transport(op: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport { op: op.into(), message: message.to_string() }
    }

    /// Build a [`WrapperError::Upstream`].
    pub fn upstream(op: impl Into<String>, message: impl ToString) -> Self {
        Self::Upstream { op: op.into(), message: message.to_string() }
    }

    /// Operation that failed.
    pub fn op(&self) -> &str {
        match self {
            Self::Configuration { op, .. }
            | Self::InvalidParameter { op, .. }
            | Self::Transport { op, .. }
            | Self::CapabilityMismatch { op, .. }
            | Self::Upstream { op, .. }
            | Self::Cancelled { op }
            | Self::DeadlineExceeded { op } => op,
        }
    }

    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Nothing in this crate retries; the flag is for callers that do.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::DeadlineExceeded { .. })
    }

    /// Wire form of this error.
    pub fn to_payload(&self) -> ErrorPayload {
        let (code, message) = match self {
            Self::Configuration { message, .. } => (ErrorPayload::CONFIGURATION, message.clone()),
            Self::InvalidParameter { message, .. } => {
                (ErrorPayload::INVALID_PARAMETER, message.clone())
            },
            Self::Transport { message, .. } => (ErrorPayload::TRANSPORT, message.clone()),
            Self::CapabilityMismatch { expected, actual, .. } => {
                (ErrorPayload::CAPABILITY_MISMATCH, format!("{expected}/{actual}"))
            },
            Self::Upstream { message, .. } => (ErrorPayload::UPSTREAM, message.clone()),
            Self::Cancelled { .. } => (ErrorPayload::CANCELLED, String::new()),
            Self::DeadlineExceeded { .. } => (ErrorPayload::DEADLINE_EXCEEDED, String::new()),
        };
        ErrorPayload::new(code, self.op(), message)
    }
}

/// Rebuild an error received over the wire.
///
/// Handshake rejections and malformed payloads are channel failures and
/// become `Transport`. Unknown codes become `Upstream`.
impl From<ErrorPayload> for WrapperError {
    fn from(payload: ErrorPayload) -> Self {
        let ErrorPayload { code, op, message } = payload;
        match code {
            ErrorPayload::CONFIGURATION => Self::Configuration { op, message },
            ErrorPayload::INVALID_PARAMETER => Self::InvalidParameter { op, message },
            ErrorPayload::TRANSPORT
            | ErrorPayload::HANDSHAKE_REJECTED
            | ErrorPayload::INVALID_PAYLOAD => Self::Transport { op, message },
            ErrorPayload::CAPABILITY_MISMATCH => {
                let parsed = message.split_once('/').and_then(|(expected, actual)| {
                    Some((expected.parse().ok()?, actual.parse().ok()?))
                });
                match parsed {
                    Some((expected, actual)) => Self::CapabilityMismatch { op, expected, actual },
                    None => Self::Upstream { op, message },
                }
            },
            ErrorPayload::CANCELLED => Self::Cancelled { op },
            ErrorPayload::DEADLINE_EXCEEDED => Self::DeadlineExceeded { op },
            _ => Self::Upstream { op, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<WrapperError> {
        vec![
            WrapperError::configuration("server.new", "nil wrapper"),
            WrapperError::invalid_parameter("reader.new_derived_reader", "length too small"),
            WrapperError::transport("wrap", "connection lost"),
            WrapperError::CapabilityMismatch {
                op: "connect".to_string(),
                expected: CapabilitySet::Full,
                actual: CapabilitySet::Base,
            },
            WrapperError::upstream("unwrap", "authentication failed"),
            WrapperError::Cancelled { op: "key_id".to_string() },
            WrapperError::DeadlineExceeded { op: "compute_hmac".to_string() },
        ]
    }

    #[test]
    fn wire_round_trip_preserves_variant() {
        for err in all_variants() {
            let rebuilt = WrapperError::from(err.to_payload());
            assert_eq!(rebuilt, err);
        }
    }

    #[test]
    fn handshake_rejection_is_transport() {
        let err = WrapperError::from(ErrorPayload::handshake_rejected("bad cookie"));
        assert!(matches!(err, WrapperError::Transport { .. }));
    }

    #[test]
    fn unknown_code_is_upstream() {
        let err = WrapperError::from(ErrorPayload::new(0xBEEF, "wrap", "mystery"));
        assert_eq!(err, WrapperError::upstream("wrap", "mystery"));
    }

    #[test]
    fn display_names_operation() {
        let err = WrapperError::invalid_parameter("reader.new_derived_reader", "missing wrapper");
        assert_eq!(
            err.to_string(),
            "reader.new_derived_reader: invalid parameter: missing wrapper"
        );
    }

    #[test]
    fn only_transport_and_deadline_are_transient() {
        let transient: Vec<bool> = all_variants().iter().map(WrapperError::is_transient).collect();
        assert_eq!(transient, vec![false, false, true, false, false, false, true]);
    }
}
