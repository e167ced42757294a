//! Server error types.

use thiserror::Error;
use wrapplug_core::WrapperError;

/// Errors that can occur while starting or running the plugin server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (cookie mismatch, bad certificate, bad address).
    ///
    /// Fatal: the plugin cannot start. Fix the launch environment.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, endpoint closed, stream I/O).
    ///
    /// Fatal for the affected connection or stream; the server keeps serving
    /// other connections.
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer sent malformed frames.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Wrapper construction or registration failed.
    #[error(transparent)]
    Wrapper(#[from] WrapperError),
}

impl From<wrapplug_proto::ProtocolError> for ServerError {
    fn from(err: wrapplug_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
