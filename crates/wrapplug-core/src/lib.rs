//! Core wrapper abstractions for wrapplug.
//!
//! A host talks to a key-wrapping backend through the [`Wrapper`] trait. Two
//! optional extensions, [`HmacComputer`] and [`InitFinalizer`], are exposed
//! only when the concrete backend supports them. The [`capability`] probe
//! resolves which extensions a wrapper has exactly once, and both the server
//! adapter and the client proxies are built from the resulting
//! [`CapabilitySet`].
//!
//! # Components
//!
//! - [`wrapper`]: the three capability traits and [`KeySource`]
//! - [`CallContext`]: cancellation token plus optional deadline
//! - [`capability`]: [`CapabilitySet`] and [`probe`]
//! - [`handshake`]: [`HandshakeConfig`] and the plugin bootstrap line
//! - [`derived_reader`]: HKDF key stream over a local wrapper's key
//! - Reference wrappers: [`AeadWrapper`], [`PooledWrapper`] and, with the
//!   `test-utils` feature, [`testing::TestWrapper`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod aead;
pub mod capability;
mod context;
mod derived;
mod error;
pub mod handshake;
pub mod multi;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod wrapper;

pub use aead::{AeadWrapper, MECHANISM_XCHACHA20_POLY1305};
pub use capability::{CapabilitySet, ProbedWrapper, probe};
pub use context::CallContext;
pub use derived::{MIN_DERIVED_LEN, derived_reader};
pub use error::WrapperError;
pub use handshake::{HandshakeConfig, HandshakeLine};
pub use multi::{BASE_KEY_ID, PooledWrapper};
pub use tokio_util::sync::CancellationToken;
pub use wrapper::{HmacComputer, InitFinalizer, KeySource, Wrapper};
pub use wrapplug_proto::payloads::wrapping::{BlobInfo, KeyInfo, WrapOptions};
