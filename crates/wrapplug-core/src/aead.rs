//! Local AEAD wrapper.

use async_trait::async_trait;
use wrapplug_crypto::{KEY_SIZE, NONCE_SIZE};
use wrapplug_proto::payloads::wrapping::{BlobInfo, KeyInfo, WrapOptions};
use zeroize::Zeroizing;

use crate::{CallContext, KeySource, Wrapper, WrapperError};

/// Mechanism id recorded in [`KeyInfo`] for XChaCha20-Poly1305 blobs.
pub const MECHANISM_XCHACHA20_POLY1305: u64 = 1;

/// XChaCha20-Poly1305 wrapper holding a 32-byte root key.
///
/// Each wrap draws a fresh random 24-byte nonce and returns it as the blob's
/// `iv`. Options' `aad` is bound into the tag, so unwrap must supply the same
/// bytes.
pub struct AeadWrapper {
    key_id: String,
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl AeadWrapper {
    /// Create a wrapper from raw key bytes.
    ///
    /// # Errors
    ///
    /// `Configuration` if the key is not 32 bytes or the key id is empty.
    pub fn new(key_id: impl Into<String>, key: &[u8]) -> Result<Self, WrapperError> {
        const OP: &str = "aead.new";

        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(WrapperError::configuration(OP, "key id is empty"));
        }
        let Ok(key) = <[u8; KEY_SIZE]>::try_from(key) else {
            return Err(WrapperError::configuration(
                OP,
                format!("key must be {KEY_SIZE} bytes, got {}", key.len()),
            ));
        };

        Ok(Self { key_id, key: Zeroizing::new(key) })
    }

    /// Raw root key.
    pub fn key_bytes(&self) -> &[u8] {
        self.key.as_slice()
    }
}

impl std::fmt::Debug for AeadWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadWrapper").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

#[async_trait]
impl Wrapper for AeadWrapper {
    async fn wrap(
        &self,
        ctx: &CallContext,
        plaintext: &[u8],
        options: &WrapOptions,
    ) -> Result<BlobInfo, WrapperError> {
        ctx.check("wrap")?;

        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::fill(&mut nonce)
            .map_err(|e| WrapperError::upstream("wrap", format!("nonce generation: {e}")))?;

        let aad = options.aad.as_deref().unwrap_or_default();
        let ciphertext = wrapplug_crypto::seal(&self.key, &nonce, plaintext, aad);

        Ok(BlobInfo {
            ciphertext,
            iv: nonce.to_vec(),
            key_info: Some(KeyInfo {
                key_id: self.key_id.clone(),
                mechanism: MECHANISM_XCHACHA20_POLY1305,
            }),
        })
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        blob: &BlobInfo,
        options: &WrapOptions,
    ) -> Result<Vec<u8>, WrapperError> {
        ctx.check("unwrap")?;

        if let Some(info) = &blob.key_info
            && info.key_id != self.key_id
        {
            return Err(WrapperError::invalid_parameter(
                "unwrap",
                format!("blob key id {:?} does not match {:?}", info.key_id, self.key_id),
            ));
        }

        let aad = options.aad.as_deref().unwrap_or_default();
        wrapplug_crypto::open(&self.key, &blob.iv, &blob.ciphertext, aad)
            .map_err(|e| WrapperError::upstream("unwrap", e))
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        ctx.check("key_id")?;
        Ok(self.key_id.clone())
    }

    fn key_source(&self) -> KeySource<'_> {
        KeySource::Direct(self.key.as_slice())
    }
}
