//! Client proxies against an in-process plugin server.

use std::{sync::Arc, time::Duration};

use wrapplug_client::{ClientOptions, Identity, WrapperProxy, connect};
use wrapplug_core::{
    AeadWrapper, BlobInfo, CallContext, CapabilitySet, HandshakeConfig, KeyInfo, WrapOptions,
    Wrapper, WrapperError, probe,
    testing::{TEST_KEY_ID, TestWrapper},
};
use wrapplug_server::{PluginOptions, PluginServer};

struct Harness {
    server: PluginServer,
    identity: Identity,
}

impl Harness {
    fn start(wrapper: impl Wrapper + 'static) -> Self {
        let identity = Identity::generate().unwrap();
        let server = PluginServer::start(
            Some(Arc::new(wrapper)),
            identity.cert_der().to_vec(),
            &PluginOptions::default(),
        )
        .unwrap();
        Self { server, identity }
    }

    async fn connect(&self, options: &ClientOptions) -> Result<WrapperProxy, WrapperError> {
        connect(self.server.local_addr(), self.server.server_cert(), &self.identity, options).await
    }

    async fn proxy(&self) -> WrapperProxy {
        self.connect(&ClientOptions::default()).await.unwrap()
    }
}

#[tokio::test]
async fn proxy_surface_matches_server_capabilities() {
    for set in CapabilitySet::ALL {
        let harness = Harness::start(TestWrapper::new(b"secret").with_capabilities(set));
        let proxy = harness.proxy().await;

        assert_eq!(proxy.capabilities(), set);
        assert_eq!(probe(Some(Arc::new(proxy.clone()))).unwrap().capabilities(), set);
        assert_eq!(probe(Some(proxy.into_wrapper())).unwrap().capabilities(), set);
    }
}

#[tokio::test]
async fn composition_picks_matching_variant() {
    let cases = [
        (CapabilitySet::Base, "Base"),
        (CapabilitySet::Hmac, "Hmac"),
        (CapabilitySet::InitFinalize, "InitFinalizer"),
        (CapabilitySet::Full, "Full"),
    ];

    for (set, variant) in cases {
        let harness = Harness::start(TestWrapper::new(b"secret").with_capabilities(set));
        let proxy = harness.proxy().await;

        let matched = match proxy {
            WrapperProxy::Base(_) => "Base",
            WrapperProxy::Hmac(_) => "Hmac",
            WrapperProxy::InitFinalizer(_) => "InitFinalizer",
            WrapperProxy::Full(_) => "Full",
        };
        assert_eq!(matched, variant);
    }
}

#[tokio::test]
async fn wrap_unwrap_round_trip() {
    let harness = Harness::start(TestWrapper::new(b"secret"));
    let proxy = harness.proxy().await;
    let ctx = CallContext::new();

    let blob = proxy.wrap(&ctx, b"attack at dawn", &WrapOptions::default()).await.unwrap();
    assert_ne!(blob.ciphertext, b"attack at dawn");
    assert_eq!(blob.key_info.as_ref().unwrap().key_id, TEST_KEY_ID);

    let plaintext = proxy.unwrap(&ctx, &blob, &WrapOptions::default()).await.unwrap();
    assert_eq!(plaintext, b"attack at dawn");
    assert_eq!(proxy.key_id(&ctx).await.unwrap(), TEST_KEY_ID);
}

#[tokio::test]
async fn aead_wrapper_binds_aad_across_the_wire() {
    let harness = Harness::start(AeadWrapper::new("root", &[7u8; 32]).unwrap());
    let proxy = harness.proxy().await;
    let ctx = CallContext::new();

    let blob = proxy.wrap(&ctx, b"secret", &WrapOptions::with_aad("tenant-a")).await.unwrap();
    assert_eq!(blob.iv.len(), 24);

    let plaintext = proxy.unwrap(&ctx, &blob, &WrapOptions::with_aad("tenant-a")).await.unwrap();
    assert_eq!(plaintext, b"secret");

    let err = proxy.unwrap(&ctx, &blob, &WrapOptions::with_aad("tenant-b")).await.unwrap_err();
    assert!(matches!(err, WrapperError::Upstream { .. }), "got {err:?}");
}

#[tokio::test]
async fn init_hmac_finalize_sequence() {
    let wrapper = TestWrapper::new(b"secret").with_capabilities(CapabilitySet::Full);
    let log = wrapper.lifecycle();
    let harness = Harness::start(wrapper);
    let proxy = Arc::new(harness.proxy().await);
    let ctx = CallContext::new();

    let lifecycle = Arc::clone(&proxy).init_finalizer().unwrap();
    let hmac = Arc::clone(&proxy).hmac_computer().unwrap();

    lifecycle.init(&ctx, &WrapOptions::default()).await.unwrap();
    assert!(log.is_initialized());

    let local = TestWrapper::new(b"secret").with_capabilities(CapabilitySet::Full);
    let expected = wrapplug_core::HmacComputer::compute_hmac(&local, &ctx, b"data").await.unwrap();
    assert_eq!(hmac.compute_hmac(&ctx, b"data").await.unwrap(), expected);
    assert_eq!(hmac.hmac_key_id(&ctx).await.unwrap(), format!("{TEST_KEY_ID}-hmac"));

    lifecycle.finalize(&ctx, &WrapOptions::default()).await.unwrap();
    assert!(!log.is_initialized());
    assert_eq!(log.init_calls(), 1);
    assert_eq!(log.finalize_calls(), 1);
}

#[tokio::test]
async fn base_proxy_exposes_no_extensions() {
    let harness = Harness::start(TestWrapper::new(b"secret"));
    let proxy = Arc::new(harness.proxy().await);

    assert!(Arc::clone(&proxy).hmac_computer().is_none());
    assert!(proxy.init_finalizer().is_none());
}

#[tokio::test]
async fn version_mismatch_fails_before_any_call() {
    let wrapper = TestWrapper::new(b"secret").with_capabilities(CapabilitySet::Full);
    let log = wrapper.lifecycle();
    let harness = Harness::start(wrapper);

    let handshake = HandshakeConfig { protocol_version: 2, ..HandshakeConfig::default() };
    let err = harness.connect(&ClientOptions::default().with_handshake(handshake)).await;

    assert!(matches!(err, Err(WrapperError::Transport { .. })), "got {err:?}");
    assert_eq!(log.init_calls(), 0);
}

#[tokio::test]
async fn cookie_mismatch_is_rejected() {
    let harness = Harness::start(TestWrapper::new(b"secret"));

    let handshake =
        HandshakeConfig { cookie_value: "not-the-cookie".to_string(), ..HandshakeConfig::default() };
    let err = harness.connect(&ClientOptions::default().with_handshake(handshake)).await;

    assert!(matches!(err, Err(WrapperError::Transport { .. })), "got {err:?}");
}

#[tokio::test]
async fn unexpected_advertisement_is_capability_mismatch() {
    let harness =
        Harness::start(TestWrapper::new(b"secret").with_capabilities(CapabilitySet::Hmac));

    let options = ClientOptions::default().expect_capabilities(CapabilitySet::Full);
    let err = harness.connect(&options).await.unwrap_err();

    assert_eq!(
        err,
        WrapperError::CapabilityMismatch {
            op: "connect".to_string(),
            expected: CapabilitySet::Full,
            actual: CapabilitySet::Hmac,
        }
    );
}

#[tokio::test]
async fn upstream_errors_keep_their_variant() {
    let harness = Harness::start(TestWrapper::new(b"secret"));
    let proxy = harness.proxy().await;

    let blob = BlobInfo {
        ciphertext: vec![1, 2, 3],
        iv: Vec::new(),
        key_info: Some(KeyInfo { key_id: "rotated-away".to_string(), mechanism: 0 }),
    };
    let err = proxy.unwrap(&CallContext::new(), &blob, &WrapOptions::default()).await.unwrap_err();

    assert!(matches!(err, WrapperError::Upstream { .. }), "got {err:?}");
    assert_eq!(err.op(), "unwrap");
}

#[tokio::test]
async fn deadline_is_enforced_on_slow_backend() {
    let harness = Harness::start(TestWrapper::new(b"secret").with_delay(Duration::from_secs(30)));
    let proxy = harness.proxy().await;

    let ctx = CallContext::new().with_timeout(Duration::from_millis(100));
    let err = proxy.key_id(&ctx).await.unwrap_err();

    assert_eq!(err, WrapperError::DeadlineExceeded { op: "key_id".to_string() });
}

#[tokio::test]
async fn cancellation_interrupts_call() {
    let harness = Harness::start(TestWrapper::new(b"secret").with_delay(Duration::from_secs(30)));
    let proxy = harness.proxy().await;

    let ctx = CallContext::new();
    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = proxy.wrap(&ctx, b"data", &WrapOptions::default()).await.unwrap_err();
    assert_eq!(err, WrapperError::Cancelled { op: "wrap".to_string() });
}

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    let harness = Harness::start(TestWrapper::new(b"secret").with_delay(Duration::from_millis(50)));
    let proxy = harness.proxy().await;

    let calls = (0..16u8).map(|i| {
        let proxy = proxy.clone();
        tokio::spawn(async move {
            let ctx = CallContext::new();
            let blob = proxy.wrap(&ctx, &[i; 8], &WrapOptions::default()).await.unwrap();
            proxy.unwrap(&ctx, &blob, &WrapOptions::default()).await.unwrap()
        })
    });

    for (i, call) in calls.enumerate() {
        assert_eq!(call.await.unwrap(), vec![i as u8; 8]);
    }
}

#[tokio::test]
async fn server_shutdown_surfaces_as_transport_error() {
    let harness = Harness::start(TestWrapper::new(b"secret"));
    let proxy = harness.proxy().await;
    let ctx = CallContext::new();
    assert!(proxy.key_id(&ctx).await.is_ok());

    harness.server.shutdown();
    harness.server.wait().await.unwrap();

    let err = proxy.key_id(&ctx).await.unwrap_err();
    assert!(matches!(err, WrapperError::Transport { .. }), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn unpinned_client_is_refused() {
    let harness = Harness::start(TestWrapper::new(b"secret"));
    let stranger = Identity::generate().unwrap();

    let err = connect(
        harness.server.local_addr(),
        harness.server.server_cert(),
        &stranger,
        &ClientOptions::default(),
    )
    .await;

    assert!(matches!(err, Err(WrapperError::Transport { .. })), "got {err:?}");
}

#[derive(Clone, Default)]
struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn injected_logger_receives_connection_events() {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::new("wrapplug_client=debug"))
        .finish();

    let harness =
        Harness::start(TestWrapper::new(b"secret").with_capabilities(CapabilitySet::Hmac));
    let options = ClientOptions::default().with_logger(tracing::Dispatch::new(subscriber));
    let proxy = harness.connect(&options).await.unwrap();
    proxy.key_id(&CallContext::new()).await.unwrap();

    let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("connected to plugin"), "logs: {logs}");
    assert!(logs.contains("plugin handshake complete"), "logs: {logs}");
    assert!(logs.contains("capabilities=hmac"), "logs: {logs}");
}
