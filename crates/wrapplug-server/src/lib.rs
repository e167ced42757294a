//! Plugin-side wrapplug server.
//!
//! Exposes a [`wrapplug_core::Wrapper`] to a host process over QUIC with
//! pinned mutual TLS. Only the services the wrapper actually supports are
//! registered, so a host can never call an extension the backend lacks.
//!
//! # Components
//!
//! - [`WrapperServer`]: probes the wrapper and registers its services
//! - [`ServiceRegistry`]: routes request opcodes to service handlers
//! - [`PluginListener`]: QUIC accept loop, handshake, per-stream dispatch
//! - [`PluginServer`] / [`serve_plugin`]: bootstrap under the host's launch
//!   environment

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod plugin;
mod registry;
mod server;
mod tls;
mod transport;

pub use error::ServerError;
pub use plugin::{PluginOptions, PluginServer, serve_plugin};
pub use registry::{ServiceHandler, ServiceRegistry};
pub use server::WrapperServer;
pub use tls::Identity;
pub use transport::{CLOSE_HANDSHAKE_REJECTED, CLOSE_SHUTDOWN, PluginListener};
