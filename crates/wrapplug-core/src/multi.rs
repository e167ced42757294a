//! Pooled multi-key wrapper.
//!
//! Holds several wrappers keyed by their key ids. New data is always wrapped
//! by the encrypting wrapper, stored under the reserved [`BASE_KEY_ID`]
//! entry; existing blobs are unwrapped by whichever wrapper owns the key id
//! recorded in the blob. This is what allows key rotation: the old key stays
//! in the pool for reads while the new one takes over writes.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use wrapplug_proto::payloads::wrapping::{BlobInfo, WrapOptions};

use crate::{CallContext, KeySource, Wrapper, WrapperError};

/// Reserved entry naming the encrypting wrapper.
pub const BASE_KEY_ID: &str = "__base__";

/// Multi-key wrapper with one encrypting member.
///
/// Mutation requires `&mut self`; share it behind an `Arc` once assembled.
pub struct PooledWrapper {
    base: Arc<dyn Wrapper>,
    base_key_id: String,
    by_key_id: HashMap<String, Arc<dyn Wrapper>>,
}

impl PooledWrapper {
    /// Pool whose encrypting wrapper is `base`.
    ///
    /// # Errors
    ///
    /// Propagates the base wrapper's `key_id` failure. `InvalidParameter` if
    /// the key id is empty or the reserved name.
    pub async fn new(ctx: &CallContext, base: Arc<dyn Wrapper>) -> Result<Self, WrapperError> {
        let base_key_id = checked_key_id(ctx, base.as_ref(), "pooled.new").await?;

        let mut by_key_id = HashMap::new();
        by_key_id.insert(base_key_id.clone(), Arc::clone(&base));

        Ok(Self { base, base_key_id, by_key_id })
    }

    /// Add a decrypt-capable member.
    ///
    /// Returns `false` without replacing anything if the key id is already
    /// present.
    pub async fn add_wrapper(
        &mut self,
        ctx: &CallContext,
        wrapper: Arc<dyn Wrapper>,
    ) -> Result<bool, WrapperError> {
        let key_id = checked_key_id(ctx, wrapper.as_ref(), "pooled.add_wrapper").await?;
        if self.by_key_id.contains_key(&key_id) {
            return Ok(false);
        }
        self.by_key_id.insert(key_id, wrapper);
        Ok(true)
    }

    /// Make `wrapper` the encrypting member, adding it to the pool.
    ///
    /// The previous encrypting wrapper stays available for unwrap.
    pub async fn set_encrypting_wrapper(
        &mut self,
        ctx: &CallContext,
        wrapper: Arc<dyn Wrapper>,
    ) -> Result<(), WrapperError> {
        let key_id = checked_key_id(ctx, wrapper.as_ref(), "pooled.set_encrypting_wrapper").await?;

        self.by_key_id.insert(key_id.clone(), Arc::clone(&wrapper));
        self.base = wrapper;
        self.base_key_id = key_id;
        Ok(())
    }

    /// Remove a member by key id. The encrypting wrapper cannot be removed.
    pub fn remove_wrapper(&mut self, key_id: &str) -> Result<bool, WrapperError> {
        if key_id == self.base_key_id || key_id == BASE_KEY_ID {
            return Err(WrapperError::invalid_parameter(
                "pooled.remove_wrapper",
                "cannot remove the encrypting wrapper",
            ));
        }
        Ok(self.by_key_id.remove(key_id).is_some())
    }

    /// The encrypting wrapper (the `__base__` entry).
    pub fn base(&self) -> &Arc<dyn Wrapper> {
        &self.base
    }

    /// Member owning `key_id`. `__base__` resolves to the encrypting wrapper.
    pub fn wrapper_for_key_id(&self, key_id: &str) -> Option<&Arc<dyn Wrapper>> {
        if key_id == BASE_KEY_ID {
            return Some(&self.base);
        }
        self.by_key_id.get(key_id)
    }

    /// Key ids of all members, sorted.
    pub fn all_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_key_id.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn checked_key_id(
    ctx: &CallContext,
    wrapper: &dyn Wrapper,
    op: &'static str,
) -> Result<String, WrapperError> {
    let key_id = wrapper.key_id(ctx).await?;
    if key_id.is_empty() || key_id == BASE_KEY_ID {
        return Err(WrapperError::invalid_parameter(op, format!("unusable key id {key_id:?}")));
    }
    Ok(key_id)
}

impl fmt::Debug for PooledWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledWrapper")
            .field("base_key_id", &self.base_key_id)
            .field("key_ids", &self.all_key_ids())
            .finish()
    }
}

#[async_trait]
impl Wrapper for PooledWrapper {
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
        let Some(info) = &blob.key_info else {
            return Err(WrapperError::invalid_parameter("unwrap", "blob has no key info"));
        };
        let Some(wrapper) = self.wrapper_for_key_id(&info.key_id) else {
            return Err(WrapperError::invalid_parameter(
                "unwrap",
                format!("no wrapper for key id {:?}", info.key_id),
            ));
        };
        wrapper.unwrap(ctx, blob, options).await
    }

    async fn key_id(&self, ctx: &CallContext) -> Result<String, WrapperError> {
        ctx.check("key_id")?;
        Ok(self.base_key_id.clone())
    }

    fn key_source(&self) -> KeySource<'_> {
        KeySource::Pooled(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AeadWrapper;

    fn aead(key_id: &str, byte: u8) -> Arc<dyn Wrapper> {
        Arc::new(AeadWrapper::new(key_id, &[byte; 32]).unwrap())
    }

    #[tokio::test]
    async fn wraps_with_base_and_unwraps_by_key_id() {
        let ctx = CallContext::new();
        let opts = WrapOptions::default();

        let mut pool = PooledWrapper::new(&ctx, aead("k1", 1)).await.unwrap();
        let old_blob = pool.wrap(&ctx, b"old", &opts).await.unwrap();

        pool.set_encrypting_wrapper(&ctx, aead("k2", 2)).await.unwrap();
        let new_blob = pool.wrap(&ctx, b"new", &opts).await.unwrap();

        assert_eq!(new_blob.key_info.as_ref().unwrap().key_id, "k2");
        assert_eq!(pool.key_id(&ctx).await.unwrap(), "k2");
        assert_eq!(pool.unwrap(&ctx, &old_blob, &opts).await.unwrap(), b"old");
        assert_eq!(pool.unwrap(&ctx, &new_blob, &opts).await.unwrap(), b"new");
        assert_eq!(pool.all_key_ids(), vec!["k1".to_string(), "k2".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_key_id_is_not_replaced() {
        let ctx = CallContext::new();
        let mut pool = PooledWrapper::new(&ctx, aead("k1", 1)).await.unwrap();

        assert!(!pool.add_wrapper(&ctx, aead("k1", 9)).await.unwrap());
        assert!(pool.add_wrapper(&ctx, aead("k3", 3)).await.unwrap());
    }

    #[tokio::test]
    async fn encrypting_wrapper_cannot_be_removed() {
        let ctx = CallContext::new();
        let mut pool = PooledWrapper::new(&ctx, aead("k1", 1)).await.unwrap();
        pool.add_wrapper(&ctx, aead("k2", 2)).await.unwrap();

        assert!(pool.remove_wrapper("k1").is_err());
        assert!(pool.remove_wrapper(BASE_KEY_ID).is_err());
        assert!(pool.remove_wrapper("k2").unwrap());
        assert!(!pool.remove_wrapper("k2").unwrap());
    }

    #[tokio::test]
    async fn unknown_key_id_is_rejected() {
        let ctx = CallContext::new();
        let pool = PooledWrapper::new(&ctx, aead("k1", 1)).await.unwrap();
        let mut blob = pool.wrap(&ctx, b"x", &WrapOptions::default()).await.unwrap();
        blob.key_info.as_mut().unwrap().key_id = "gone".to_string();

        let err = pool.unwrap(&ctx, &blob, &WrapOptions::default()).await.unwrap_err();
        assert!(matches!(err, WrapperError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn reserved_key_id_is_rejected() {
        let ctx = CallContext::new();
        let result = PooledWrapper::new(&ctx, aead(BASE_KEY_ID, 1)).await;
        assert!(matches!(result, Err(WrapperError::InvalidParameter { .. })));
    }

    #[tokio::test]
    async fn base_entry_resolves_to_encryptor() {
        let ctx = CallContext::new();
        let pool = PooledWrapper::new(&ctx, aead("k1", 1)).await.unwrap();

        let base = pool.wrapper_for_key_id(BASE_KEY_ID).unwrap();
        assert_eq!(base.key_id(&ctx).await.unwrap(), "k1");
        assert!(matches!(pool.key_source(), KeySource::Pooled(_)));
    }
}
