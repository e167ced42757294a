//! Test wrapper with runtime-selected capabilities.
//!
//! Not a cipher: data is XORed with the secret. Used to exercise every
//! capability combination without real key management.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use wrapplug_proto::payloads::wrapping::{BlobInfo, KeyInfo, WrapOptions};

use crate::{
    CallContext, CapabilitySet, HmacComputer, InitFinalizer, KeySource, Wrapper, WrapperError,
};

/// Key id reported by a default [`TestWrapper`].
pub const TEST_KEY_ID: &str = "static-key";

/// Observable lifecycle state, shared across clones of the handle.
#[derive(Debug, Default)]
pub struct LifecycleLog {
    init_calls: AtomicUsize,
    finalize_calls: AtomicUsize,
    initialized: AtomicBool,
}

impl LifecycleLog {
    /// Number of `init` calls.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `finalize` calls.
    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    /// Whether `init` ran and `finalize` has not.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// XOR wrapper for tests.
#[derive(Debug)]
pub struct TestWrapper {
    secret: Vec<u8>,
    key_id: String,
    capabilities: CapabilitySet,
    delay: Option<Duration>,
    lifecycle: Arc<LifecycleLog>,
}

impl TestWrapper {
    /// Base-only wrapper over `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
            key_id: TEST_KEY_ID.to_string(),
            capabilities: CapabilitySet::Base,
            delay: None,
            lifecycle: Arc::default(),
        }
    }

    /// Expose the optional capabilities in `capabilities`.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Report `key_id` instead of [`TEST_KEY_ID`].
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Sleep this long inside every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Lifecycle log handle, valid after the wrapper moves into an `Arc`.
    pub fn lifecycle(&self) -> Arc<LifecycleLog> {
        Arc::clone(&self.lifecycle)
    }

    /// Raw secret.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    fn xor(&self, data: &[u8]) -> Vec<u8> {
        if self.secret.is_empty() {
            return data.to_vec();
        }
        data.iter().zip(self.secret.iter().cycle()).map(|(d, k)| d ^ k).collect()
    }

    async fn pause(&self, ctx: &CallContext, op: &str) -> Result<(), WrapperError> {
        ctx.check(op)?;
        if let Some(delay) = self.delay {
            ctx.run(op, async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Wrapper for TestWrapper {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        _options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        self.pause(ctx, "wrap").await?;

        Ok(BlobInfo {
            ciphertext: self.xor(plaintext),
            iv: Vec::new(),
            key_info: Some(KeyInfo { key_id: self.key_id.clone(), mechanism: 0 }),
        })
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        _options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        self.pause(ctx, "unwrap").await?;

        if let Some(info) = &blob.key_info
            && info.key_id != self.key_id
        {
            return Err(WrapperError::upstream(
                "unwrap",
                format!("unknown key id {:?}", info.key_id),
            ));
        }
        Ok(self.xor(&blob.ciphertext))
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.pause(ctx, "key_id").await?;
        Ok(self.key_id.clone())
    }

    fn hmac_computer(self: Arc<Self>) -> Option<Arc<dyn HmacComputer>> {
        if self.capabilities.has_hmac() { Some(self) } else { None }
    }

    fn init_finalizer(self: Arc<Self>) -> Option<Arc<dyn InitFinalizer>> {
        if self.capabilities.has_init_finalizer() { Some(self) } else { None }
    }

    fn key_source(&self) -> KeySource<'_> {
        KeySource::Test(&self.secret)
    }
}

#[async_trait]
impl HmacComputer for TestWrapper {
    async fn hmac_key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        self.pause(ctx, "hmac_key_id").await?;
        Ok(format!("{}-hmac", self.key_id))
    }

    async fn compute_hmac(&self, ctx: &CallContext, data: &[u8]) -> Result<Vec<u8>, WrapperError> {
        self.pause(ctx, "compute_hmac").await?;
        Ok(wrapplug_crypto::hmac_sha256(&self.secret, data).to_vec())
    }
}

#[async_trait]
impl InitFinalizer for TestWrapper {
    async fn init(&self, ctx: &CallContext, _options: &WrapOptions) -> Result<(), WrapperError> {
        self.pause(ctx, "init").await?;
        self.lifecycle.init_calls.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn finalize(
        &self,
        ctx: &CallContext,
        _options: &WrapOptions,
    ) -> Result<(), WrapperError> {
        self.pause(ctx, "finalize").await?;
        self.lifecycle.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.lifecycle.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
