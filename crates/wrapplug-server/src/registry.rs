//! Service registry: routes request opcodes to registered service handlers.
//!
//! Each service may be registered once. The registry is assembled before the
//! listener starts and is read-only afterwards, so dispatch takes `&self` and
//! needs no locking.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use wrapplug_core::{CallContext, WrapperError};
use wrapplug_proto::{ErrorPayload, Payload, ServiceKind};

/// Handler for every request opcode owned by one service.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Answer `request`. Failures are returned as [`Payload::Error`].
    async fn handle(&self, ctx: &CallContext, request: Payload) -> Payload;
}

/// Services reachable on a connection.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<ServiceKind, Arc<dyn ServiceHandler>>,
}

impl ServiceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` as the owner of `service`.
    ///
    /// # Errors
    ///
    /// `Configuration` if `service` is already registered.
    pub fn register(
        &mut self,
        service: ServiceKind,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<(), WrapperError> {
        if self.services.contains_key(&service) {
            return Err(WrapperError::configuration(
                "server.register",
                format!("malformed registration: service {service} already registered"),
            ));
        }

        tracing::debug!(%service, "registered service");
        self.services.insert(service, handler);
        Ok(())
    }

    /// Whether `service` has a handler.
    pub fn contains(&self, service: ServiceKind) -> bool {
        self.services.contains_key(&service)
    }

    /// Registered services in wire order.
    pub fn services(&self) -> Vec<ServiceKind> {
        ServiceKind::ALL.into_iter().filter(|s| self.contains(*s)).collect()
    }

    /// Route `request` to its service.
    ///
    /// Requests for unregistered services, and non-request opcodes, get an
    /// `unimplemented` error reply.
    pub async fn dispatch(&self, ctx: &CallContext, request: Payload) -> Payload {
        let opcode = request.opcode();
        let handler = opcode.service().and_then(|service| self.services.get(&service));

        match handler {
            Some(handler) => handler.handle(ctx, request).await,
            None => {
                tracing::debug!(op = opcode.op_name(), "request for unregistered service");
                Payload::Error(ErrorPayload::unimplemented(opcode))
            },
        }
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry").field("services", &self.services()).finish()
    }
}

#[cfg(test)]
mod tests {
    use wrapplug_proto::payloads::wrapping::{CallRequest, KeyIdReply};

    use super::*;

    struct Echo;

    #[async_trait]
    impl ServiceHandler for Echo {
        async fn handle(&self, _ctx: &CallContext, _request: Payload) -> Payload {
            Payload::KeyIdReply(KeyIdReply { key_id: "echo".to_string() })
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ServiceRegistry::new();
        registry.register(ServiceKind::Wrapping, Arc::new(Echo)).unwrap();

        let err = registry.register(ServiceKind::Wrapping, Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, WrapperError::Configuration { .. }));
        assert!(err.to_string().contains("malformed registration"));
    }

    #[tokio::test]
    async fn dispatch_routes_by_opcode() {
        let mut registry = ServiceRegistry::new();
        registry.register(ServiceKind::Wrapping, Arc::new(Echo)).unwrap();

        let reply = registry
            .dispatch(&CallContext::new(), Payload::KeyId(CallRequest::default()))
            .await;
        assert_eq!(reply, Payload::KeyIdReply(KeyIdReply { key_id: "echo".to_string() }));
    }

    #[tokio::test]
    async fn unregistered_service_is_unimplemented() {
        let mut registry = ServiceRegistry::new();
        registry.register(ServiceKind::Wrapping, Arc::new(Echo)).unwrap();

        let reply = registry
            .dispatch(&CallContext::new(), Payload::HmacKeyId(CallRequest::default()))
            .await;
        let Payload::Error(err) = reply else {
            panic!("expected error reply, got {reply:?}");
        };
        assert_eq!(err.code, ErrorPayload::UNIMPLEMENTED);
    }

    #[test]
    fn services_listed_in_wire_order() {
        let mut registry = ServiceRegistry::new();
        registry.register(ServiceKind::HmacComputer, Arc::new(Echo)).unwrap();
        registry.register(ServiceKind::Wrapping, Arc::new(Echo)).unwrap();

        assert_eq!(registry.services(), vec![ServiceKind::Wrapping, ServiceKind::HmacComputer]);
    }
}
