//! Host-side wrapplug client.
//!
//! Launches or connects to a plugin, performs the in-band handshake, and
//! composes a [`WrapperProxy`] exposing exactly the capabilities the plugin
//! advertised. Each proxy implements [`wrapplug_core::Wrapper`] and, when
//! served, [`wrapplug_core::HmacComputer`] and
//! [`wrapplug_core::InitFinalizer`], so code written against the core traits
//! cannot tell a remote wrapper from a local one.
//!
//! # Components
//!
//! - [`connect`]: QUIC connection with pinned mutual TLS, hello, composition
//! - [`RpcConnection`]: one stream per call, deadline propagation
//! - [`WrapperProxy`] and the four typed proxies
//! - [`PluginClient`]: spawns the plugin process and owns its lifetime

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod launcher;
mod options;
mod proxy;
mod tls;

pub use connection::{RpcConnection, connect};
pub use launcher::PluginClient;
pub use options::{ClientOptions, TransportConfig};
pub use proxy::{
    WrapClient, WrapHmacClient, WrapInitFinalizerClient, WrapInitFinalizerHmacClient,
    WrapperProxy,
};
pub use tls::Identity;
