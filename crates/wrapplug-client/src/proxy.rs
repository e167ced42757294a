//! Typed wrapper proxies.
//!
//! One struct per capability combination, each implementing exactly the
//! traits its plugin serves. Larger proxies embed the smaller ones and
//! delegate. [`WrapperProxy`] is the closed set of the four, chosen from the
//! plugin's advertisement at connect time.

use std::sync::Arc;

use async_trait::async_trait;
use wrapplug_core::{
    BlobInfo, CallContext, CapabilitySet, HmacComputer, InitFinalizer, WrapOptions, Wrapper,
    WrapperError,
};
use wrapplug_proto::{
    Payload,
    payloads::{
        hmac::ComputeHmacRequest,
        lifecycle::LifecycleRequest,
        wrapping::{CallRequest, UnwrapRequest, WrapRequest},
    },
};

use crate::connection::{RpcConnection, unexpected_reply};

/// Proxy for a plugin serving only the base wrapping service.
#[derive(Debug, Clone)]
pub struct WrapClient {
    conn: Arc<RpcConnection>,
}

impl WrapClient {
    pub(crate) fn new(conn: Arc<RpcConnection>) -> Self {
        Self { conn }
    }

    /// Underlying connection.
    pub fn connection(&self) -> &RpcConnection {
        &self.conn
    }

    async fn init(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError> {
        let request = Payload::Init(LifecycleRequest {
            options: options.clone(),
            timeout_ms: ctx.timeout_ms(),
        });
        match self.conn.call(ctx, "init", request).await? {
            Payload::InitReply => Ok(()),
            other => Err(unexpected_reply("init", &other)),
        }
    }

    async fn finalize(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError> {
        let request = Payload::Finalize(LifecycleRequest {
            options: options.clone(),
            timeout_ms: ctx.timeout_ms(),
        });
        match self.conn.call(ctx, "finalize", request).await? {
            Payload::FinalizeReply => Ok(()),
            other => Err(unexpected_reply("finalize", &other)),
        }
    }

    async fn hmac_key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        let request = Payload::HmacKeyId(CallRequest { timeout_ms: ctx.timeout_ms() });
        match self.conn.call(ctx, "hmac_key_id", request).await? {
            Payload::HmacKeyIdReply(reply) => Ok(reply.key_id),
            other => Err(unexpected_reply("hmac_key_id", &other)),
        }
    }

    async fn compute_hmac(&self, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>, WrapperError> {
        let request = Payload::ComputeHmac(ComputeHmacRequest {
            data: data.to_vec(),
            timeout_ms: ctx.timeout_ms(),
        });
        match self.conn.call(ctx, "compute_hmac", request).await? {
            Payload::ComputeHmacReply(reply) => Ok(reply.digest),
            other => Err(unexpected_reply("compute_hmac", &other)),
        }
    }
}

#[async_trait]
impl Wrapper for WrapClient {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        let request = Payload::Wrap(WrapRequest {
            plaintext: plaintext.to_vec(),
            options: options.clone(),
            timeout_ms: ctx.timeout_ms(),
        });
        match self.conn.call(ctx, "wrap", request).await? {
            Payload::WrapReply(blob) => Ok(blob),
            other => Err(unexpected_reply("wrap", &other)),
        }
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        let request = Payload::Unwrap(UnwrapRequest {
            blob: blob.clone(),
            options: options.clone(),
            timeout_ms: ctx.timeout_ms(),
        });
        match self.conn.call(ctx, "unwrap", request).await? {
            Payload::UnwrapReply(reply) => Ok(reply.plaintext),
            other => Err(unexpected_reply("unwrap", &other)),
        }
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        let request = Payload::KeyId(CallRequest { timeout_ms: ctx.timeout_ms() });
        match self.conn.call(ctx, "key_id", request).await? {
            Payload::KeyIdReply(reply) => Ok(reply.key_id),
            other => Err(unexpected_reply("key_id", &other)),
        }
    }
}

/// Proxy for a plugin serving wrapping and init/finalize.
#[derive(Debug, Clone)]
pub struct WrapInitFinalizerClient {
    base: WrapClient,
}

impl WrapInitFinalizerClient {
    /// Embedded base proxy.
    pub fn base(&self) -> &WrapClient {
        &self.base
    }
}

#[async_trait]
impl Wrapper for WrapInitFinalizerClient {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        self.base.wrap(ctx, plaintext, options).await
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        self.base.unwrap(ctx, blob, options).await
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.base.key_id(ctx).await
    }

    fn init_finalizer(self: Arc<Self>) -> Option<Arc<dyn InitFinalizer>> {
        Some(self)
    }
}

#[async_trait]
impl InitFinalizer for WrapInitFinalizerClient {
    async fn init(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError> {
        self.base.init(ctx, options).await
    }

    async fn finalize(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError> {
        self.base.finalize(ctx, options).await
    }
}

/// Proxy for a plugin serving wrapping and HMAC.
#[derive(Debug, Clone)]
pub struct WrapHmacClient {
    base: WrapClient,
}

impl WrapHmacClient {
    /// Embedded base proxy.
    pub fn base(&self) -> &WrapClient {
        &self.base
    }
}

#[async_trait]
impl Wrapper for WrapHmacClient {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        self.base.wrap(ctx, plaintext, options).await
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        self.base.unwrap(ctx, blob, options).await
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.base.key_id(ctx).await
    }

    fn hmac_computer(self: Arc<Self>) -> Option<Arc<dyn HmacComputer>> {
        Some(self)
    }
}

#[async_trait]
impl HmacComputer for WrapHmacClient {
    async fn hmac_key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.base.hmac_key_id(ctx).await
    }

    async fn compute_hmac(&self, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>, WrapperError> {
        self.base.compute_hmac(ctx, data).await
    }
}

/// Proxy for a plugin serving all three services.
#[derive(Debug, Clone)]
pub struct WrapInitFinalizerHmacClient {
    lifecycle: WrapInitFinalizerClient,
}

impl WrapInitFinalizerHmacClient {
    /// Embedded init/finalize proxy.
    pub fn lifecycle(&self) -> &WrapInitFinalizerClient {
        &self.lifecycle
    }

    fn base(&self) -> &WrapClient {
        &self.lifecycle.base
    }
}

#[async_trait]
impl Wrapper for WrapInitFinalizerHmacClient {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        self.lifecycle.wrap(ctx, plaintext, options).await
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        self.lifecycle.unwrap(ctx, blob, options).await
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.lifecycle.key_id(ctx).await
    }

    fn hmac_computer(self: Arc<Self>) -> Option<Arc<dyn HmacComputer>> {
        Some(self)
    }

    fn init_finalizer(self: Arc<Self>) -> Option<Arc<dyn InitFinalizer>> {
        Some(self)
    }
}

#[async_trait]
impl InitFinalizer for WrapInitFinalizerHmacClient {
    async fn init(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError> {
        InitFinalizer::init(&self.lifecycle, ctx, options).await
    }

    async fn finalize(&self, ctx: &CallContext, options: &WrapOptions) -> Result<(), WrapperError> {
        InitFinalizer::finalize(&self.lifecycle, ctx, options).await
    }
}

#[async_trait]
impl HmacComputer for WrapInitFinalizerHmacClient {
    async fn hmac_key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.base().hmac_key_id(ctx).await
    }

    async fn compute_hmac(&self, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>, WrapperError> {
        self.base().compute_hmac(ctx, data).await
    }
}

/// Proxy composed from a plugin's advertised capabilities.
#[derive(Debug, Clone)]
pub enum WrapperProxy {
    /// Wrapping only
    Base(WrapClient),
    /// Wrapping and init/finalize
    InitFinalizer(WrapInitFinalizerClient),
    /// Wrapping and HMAC
    Hmac(WrapHmacClient),
    /// All three services
    Full(WrapInitFinalizerHmacClient),
}

impl WrapperProxy {
    pub(crate) fn compose(conn: Arc<RpcConnection>, capabilities: CapabilitySet) -> Self {
        let base = WrapClient::new(conn);
        match capabilities {
            CapabilitySet::Full => Self::Full(WrapInitFinalizerHmacClient {
                lifecycle: WrapInitFinalizerClient { base },
            }),
            CapabilitySet::InitFinalize => Self::InitFinalizer(WrapInitFinalizerClient { base }),
            CapabilitySet::Hmac => Self::Hmac(WrapHmacClient { base }),
            CapabilitySet::Base => Self::Base(base),
        }
    }

    /// Capability set of the composed proxy.
    pub fn capabilities(&self) -> CapabilitySet {
        match self {
            Self::Base(_) => CapabilitySet::Base,
            Self::InitFinalizer(_) => CapabilitySet::InitFinalize,
            Self::Hmac(_) => CapabilitySet::Hmac,
            Self::Full(_) => CapabilitySet::Full,
        }
    }

    /// Shared base proxy.
    pub fn base(&self) -> &WrapClient {
        match self {
            Self::Base(client) => client,
            Self::InitFinalizer(client) => &client.base,
            Self::Hmac(client) => &client.base,
            Self::Full(client) => client.base(),
        }
    }

    /// The concrete proxy as a trait object.
    pub fn into_wrapper(self) -> Arc<dyn Wrapper> {
        match self {
            Self::Base(client) => Arc::new(client),
            Self::InitFinalizer(client) => Arc::new(client),
            Self::Hmac(client) => Arc::new(client),
            Self::Full(client) => Arc::new(client),
        }
    }

    /// Close the connection to the plugin.
    pub fn close(&self) {
        self.base().connection().close();
    }
}

#[async_trait]
impl Wrapper for WrapperProxy {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        self.base().wrap(ctx, plaintext, options).await
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        self.base().unwrap(ctx, blob, options).await
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.base().key_id(ctx).await
    }

    fn hmac_computer(self: Arc<Self>) -> Option<Arc<dyn HmacComputer>> {
        match &*self {
            Self::Hmac(client) => Some(Arc::new(client.clone())),
            Self::Full(client) => Some(Arc::new(client.clone())),
            Self::Base(_) | Self::InitFinalizer(_) => None,
        }
    }

    fn init_finalizer(self: Arc<Self>) -> Option<Arc<dyn InitFinalizer>> {
        match &*self {
            Self::InitFinalizer(client) => Some(Arc::new(client.clone())),
            Self::Full(client) => Some(Arc::new(client.clone())),
            Self::Base(_) | Self::Hmac(_) => None,
        }
    }
}
