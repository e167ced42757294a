//! Wrapper capability traits.
//!
//! [`Wrapper`] is the mandatory base. [`HmacComputer`] and [`InitFinalizer`]
//! are optional extensions a concrete wrapper may also implement; a wrapper
//! advertises them through [`Wrapper::hmac_computer`] and
//! [`Wrapper::init_finalizer`], which the capability probe calls once.

use std::sync::Arc;

use async_trait::async_trait;
use wrapplug_proto::payloads::wrapping::{BlobInfo, WrapOptions};

use crate::{CallContext, WrapperError, multi::PooledWrapper};

/// Envelope-encryption backend: wraps and unwraps data under a key.
#[async_trait]
pub trait Wrapper: Send + Sync {
    /// Encrypt `plaintext`.
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError>;

    /// Decrypt a blob produced by [`Wrapper::wrap`].
    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError>;

    /// Identifier of the key currently used for wrapping.
    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError>;

    /// HMAC capability, if this wrapper has one.
    fn hmac_computer(self: Arc<Self>) -> Option<Arc<dyn HmacComputer>> {
        None
    }

    /// Init/finalize capability, if this wrapper has one.
    fn init_finalizer(self: Arc<Self>) -> Option<Arc<dyn InitFinalizer>> {
        None
    }

    /// Where derivable key material lives, for [`crate::derived_reader`].
    fn key_source(&self) -> KeySource<'_> {
        KeySource::Opaque
    }
}

/// Optional HMAC computation over a wrapper-held key.
#[async_trait]
pub trait HmacComputer: Send + Sync {
    /// Identifier of the HMAC key.
    async fn hmac_key_id(&self, ctx: &CallContext) -> Result<String, WrapperError>;

    /// Keyed digest of `data`.
    async fn compute_hmac(&self, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>, WrapperError>;
}

/// Optional backend lifecycle hooks.
#[async_trait]
pub trait InitFinalizer: Send + Sync {
    /// Prepare the backend before first use.
    async fn init(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError>;

    /// Release backend resources.
    async fn finalize(&self, ctx: &CallContext, options: &WrapOptions)
    -> Result<(), WrapperError>;
}

/// Shape of a wrapper's key material as seen by key derivation.
///
/// Closed set: anything that is not one of the known local shapes is
/// `Opaque`, including RPC proxies.
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    /// Multi-key wrapper; derivation uses its reserved base entry
    Pooled(&'a PooledWrapper),
    /// Local AEAD wrapper holding raw key bytes
    Direct(&'a [u8]),
    /// Test wrapper holding a raw secret
    Test(&'a [u8]),
    /// No derivable key material
    Opaque,
}

impl KeySource<'_> {
    /// Short shape name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pooled(_) => "pooled",
            Self::Direct(_) => "direct",
            Self::Test(_) => "test",
            Self::Opaque => "opaque",
        }
    }
}
