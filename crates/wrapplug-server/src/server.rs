//! Server adapter: exposes a probed wrapper as RPC services.
//!
//! The wrapper is probed once in [`WrapperServer::new`]. Each service handler
//! holds the resolved trait object for its capability, so requests never
//! re-probe and a handler for an absent capability is never registered.

use std::sync::Arc;

use async_trait::async_trait;
use wrapplug_core::{
    CallContext, CapabilitySet, HmacComputer, InitFinalizer, ProbedWrapper, Wrapper, WrapperError,
    probe,
};
use wrapplug_proto::{
    ErrorPayload, Payload, ServiceKind,
    payloads::{
        hmac::ComputeHmacReply,
        wrapping::{KeyIdReply, UnwrapReply},
    },
};

use crate::registry::{ServiceHandler, ServiceRegistry};

/// Server-side adapter around one wrapper.
#[derive(Debug, Clone)]
pub struct WrapperServer {
    probed: ProbedWrapper,
}

impl WrapperServer {
    /// Probe `wrapper` and fix its capability set.
    ///
    /// # Errors
    ///
    /// `Configuration` if `wrapper` is `None`.
    pub fn new(wrapper: Option<Arc<dyn Wrapper>>) -> Result<Self, WrapperError> {
        let probed = probe(wrapper)?;
        tracing::info!(capabilities = %probed.capabilities(), "wrapper server created");
        Ok(Self { probed })
    }

    /// Capability set fixed at construction.
    pub fn capabilities(&self) -> CapabilitySet {
        self.probed.capabilities()
    }

    /// Register the wrapping service and every probed optional service.
    ///
    /// # Errors
    ///
    /// `Configuration` if any of those services is already registered.
    pub fn register(&self, registry: &mut ServiceRegistry) -> Result<(), WrapperError> {
        registry.register(
            ServiceKind::Wrapping,
            Arc::new(WrappingService { wrapper: Arc::clone(self.probed.wrapper()) }),
        )?;

        if let Some(hmac) = self.probed.hmac() {
            let service = HmacService { hmac: Arc::clone(hmac) };
            registry.register(ServiceKind::HmacComputer, Arc::new(service))?;
        }

        if let Some(lifecycle) = self.probed.init_finalizer() {
            registry.register(
                ServiceKind::InitFinalize,
                Arc::new(LifecycleService { lifecycle: Arc::clone(lifecycle) }),
            )?;
        }

        Ok(())
    }

    /// Fresh registry holding this server's services.
    pub fn registry(&self) -> Result<ServiceRegistry, WrapperError> {
        let mut registry = ServiceRegistry::new();
        self.register(&mut registry)?;
        Ok(registry)
    }
}

/// Context for one request: the connection's context narrowed by the
/// propagated client deadline.
fn scoped(ctx: &CallContext, timeout_ms: Option<u64>) -> CallContext {
    match timeout_ms {
        Some(ms) => ctx.child().with_timeout(std::time::Duration::from_millis(ms)),
        None => ctx.child(),
    }
}

fn reply<T>(result: Result<T, WrapperError>, ok: impl FnOnce(T) -> Payload) -> Payload {
    match result {
        Ok(value) => ok(value),
        Err(err) => {
            tracing::debug!(op = err.op(), error = %err, "call failed");
            Payload::Error(err.to_payload())
        },
    }
}

fn wrong_payload(request: &Payload) -> Payload {
    let opcode = request.opcode();
    Payload::Error(ErrorPayload::invalid_payload(opcode.op_name(), "unexpected request opcode"))
}

struct WrappingService {
    wrapper: Arc<dyn Wrapper>,
}

#[async_trait]
impl ServiceHandler for WrappingService {
    async fn handle(&self, ctx: &CallContext, request: Payload) -> Payload {
        match request {
            Payload::Wrap(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result =
                    ctx.run("wrap", self.wrapper.wrap(&ctx, &req.plaintext, &req.options)).await;
                reply(result, Payload::WrapReply)
            },
            Payload::Unwrap(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result =
                    ctx.run("unwrap", self.wrapper.unwrap(&ctx, &req.blob, &req.options)).await;
                reply(result, |plaintext| Payload::UnwrapReply(UnwrapReply { plaintext }))
            },
            Payload::KeyId(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result = ctx.run("key_id", self.wrapper.key_id(&ctx)).await;
                reply(result, |key_id| Payload::KeyIdReply(KeyIdReply { key_id }))
            },
            other => wrong_payload(&other),
        }
    }
}

struct HmacService {
    hmac: Arc<dyn HmacComputer>,
}

#[async_trait]
impl ServiceHandler for HmacService {
    async fn handle(&self, ctx: &CallContext, request: Payload) -> Payload {
        match request {
            Payload::HmacKeyId(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result = ctx.run("hmac_key_id", self.hmac.hmac_key_id(&ctx)).await;
                reply(result, |key_id| Payload::HmacKeyIdReply(KeyIdReply { key_id }))
            },
            Payload::ComputeHmac(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result =
                    ctx.run("compute_hmac", self.hmac.compute_hmac(&ctx, &req.data)).await;
                reply(result, |digest| Payload::ComputeHmacReply(ComputeHmacReply { digest }))
            },
            other => wrong_payload(&other),
        }
    }
}

struct LifecycleService {
    lifecycle: Arc<dyn InitFinalizer>,
}

#[async_trait]
impl ServiceHandler for LifecycleService {
    async fn handle(&self, ctx: &CallContext, request: Payload) -> Payload {
        match request {
            Payload::Init(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result = ctx.run("init", self.lifecycle.init(&ctx, &req.options)).await;
                reply(result, |()| Payload::InitReply)
            },
            Payload::Finalize(req) => {
                let ctx = scoped(ctx, req.timeout_ms);
                let result =
                    ctx.run("finalize", self.lifecycle.finalize(&ctx, &req.options)).await;
                reply(result, |()| Payload::FinalizeReply)
            },
            other => wrong_payload(&other),
        }
    }
}
