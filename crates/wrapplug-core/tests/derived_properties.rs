//! Property tests for the derived key reader.

use std::{io::Read, sync::Arc};

use proptest::prelude::*;
use wrapplug_core::{
    AeadWrapper, CallContext, PooledWrapper, Wrapper, WrapperError, derived_reader,
    testing::TestWrapper,
};

fn derive(wrapper: &dyn Wrapper, limit: u64, salt: &[u8], info: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    derived_reader(Some(wrapper), limit, Some(salt), Some(info))
        .expect("valid request")
        .read_to_end(&mut out)
        .expect("within hkdf ceiling");
    out
}

proptest! {
    #[test]
    fn prop_stream_length_equals_limit(
        secret in prop::collection::vec(any::<u8>(), 1..64),
        limit in 20u64..=hkdf_ceiling(),
    ) {
        let wrapper = TestWrapper::new(&secret);
        prop_assert_eq!(derive(&wrapper, limit, b"", b"").len() as u64, limit);
    }

    #[test]
    fn prop_shorter_limit_is_prefix(
        secret in prop::collection::vec(any::<u8>(), 1..64),
        salt in prop::collection::vec(any::<u8>(), 0..32),
        info in prop::collection::vec(any::<u8>(), 0..32),
        short in 20u64..200,
        extra in 0u64..200,
    ) {
        let wrapper = TestWrapper::new(&secret);
        let a = derive(&wrapper, short, &salt, &info);
        let b = derive(&wrapper, short + extra, &salt, &info);
        prop_assert_eq!(&b[..a.len()], &a[..]);
    }

    #[test]
    fn prop_short_limits_rejected(limit in 0u64..20) {
        let wrapper = TestWrapper::new(b"secret");
        let result = derived_reader(Some(&wrapper), limit, None, None);
        let rejected = matches!(result, Err(WrapperError::InvalidParameter { .. }));
        prop_assert!(rejected, "limit {} was accepted", limit);
    }
}

fn hkdf_ceiling() -> u64 {
    255 * 32
}

#[tokio::test]
async fn rotated_pool_derives_from_current_encryptor() {
    let ctx = CallContext::new();
    let first: Arc<dyn Wrapper> = Arc::new(AeadWrapper::new("k1", &[1u8; 32]).unwrap());
    let second: Arc<dyn Wrapper> = Arc::new(AeadWrapper::new("k2", &[2u8; 32]).unwrap());

    let mut pool = PooledWrapper::new(&ctx, Arc::clone(&first)).await.unwrap();
    let before = derive(&pool, 32, b"s", b"i");
    assert_eq!(before, derive(first.as_ref(), 32, b"s", b"i"));

    pool.set_encrypting_wrapper(&ctx, Arc::clone(&second)).await.unwrap();
    let after = derive(&pool, 32, b"s", b"i");
    assert_eq!(after, derive(second.as_ref(), 32, b"s", b"i"));
    assert_ne!(before, after);
}
