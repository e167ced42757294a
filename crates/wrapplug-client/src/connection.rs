//! RPC connection to a plugin.
//!
//! Every call opens its own bidirectional stream, writes one request frame
//! and reads one reply frame, so calls never block each other. Dropping an
//! in-flight call resets its stream, which the server observes as
//! cancellation.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use quinn::{Connection, Endpoint, VarInt};
use tracing::{Dispatch, instrument::WithSubscriber};
use wrapplug_core::{CallContext, CapabilitySet, HandshakeConfig, WrapperError};
use wrapplug_proto::{Frame, FrameHeader, Opcode, Payload, ServiceKind};

use crate::{
    ClientOptions, WrapperProxy,
    tls::{self, Identity},
};

const MAX_FRAME_LEN: usize = FrameHeader::SIZE + FrameHeader::MAX_PAYLOAD_SIZE as usize;

/// Close code sent when the host is done with the plugin.
const CLOSE_CLIENT_DONE: u32 = 0;

/// Connect to a plugin at `addr`, pinning `server_cert`, and compose the proxy
/// matching the services it advertises.
///
/// # Errors
///
/// - `Transport` if the connection or the hello fails, including a rejected
///   handshake
/// - `CapabilityMismatch` if `options.expected` is set and differs from the
///   advertisement
pub async fn connect(
    addr: SocketAddr,
    server_cert: &[u8],
    identity: &Identity,
    options: &ClientOptions,
) -> Result<WrapperProxy, WrapperError> {
    let dispatch = options.logger();
    let timeout = options.transport.connect_timeout;

    let (conn, advertised) = tokio::time::timeout(
        timeout,
        RpcConnection::open(addr, server_cert, identity, options, dispatch.clone()),
    )
    .with_subscriber(dispatch)
    .await
    .map_err(|_| WrapperError::transport("connect", format!("timed out after {timeout:?}")))??;

    if let Some(expected) = options.expected
        && expected != advertised
    {
        conn.close();
        return Err(WrapperError::CapabilityMismatch {
            op: "connect".to_string(),
            expected,
            actual: advertised,
        });
    }

    Ok(WrapperProxy::compose(Arc::new(conn), advertised))
}

/// Established, handshaken connection to a plugin.
pub struct RpcConnection {
    endpoint: Endpoint,
    connection: Connection,
    next_request_id: AtomicU32,
    dispatch: Dispatch,
}

impl RpcConnection {
    async fn open(
        addr: SocketAddr,
        server_cert: &[u8],
        identity: &Identity,
        options: &ClientOptions,
        dispatch: Dispatch,
    ) -> Result<(Self, CapabilitySet), WrapperError> {
        let transport = |message: String| WrapperError::transport("connect", message);

        let config = tls::client_config(identity, server_cert, &options.transport)?;
        let bind_addr = if addr.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };

        let mut endpoint = Endpoint::client(bind_addr)
            .map_err(|e| transport(format!("endpoint creation failed: {e}")))?;
        endpoint.set_default_client_config(config);

        let connection = endpoint
            .connect(addr, "localhost")
            .map_err(|e| transport(format!("connect failed: {e}")))?
            .await
            .map_err(|e| transport(format!("connection failed: {e}")))?;

        tracing::debug!(%addr, "connected to plugin");

        let conn = Self { endpoint, connection, next_request_id: AtomicU32::new(1), dispatch };
        let capabilities = conn.hello(&options.handshake).await?;

        tracing::info!(%addr, %capabilities, "plugin handshake complete");
        Ok((conn, capabilities))
    }

    /// Send the in-band hello and read the advertised services.
    async fn hello(&self, handshake: &HandshakeConfig) -> Result<CapabilitySet, WrapperError> {
        let op = Opcode::Hello.op_name();

        let reply = match self.exchange(op, Payload::Hello(handshake.hello())).await? {
            Payload::HelloReply(reply) => reply,
            Payload::Error(err) => {
                self.close();
                return Err(err.into());
            },
            other => return Err(unexpected_reply(op, &other)),
        };

        if reply.protocol_version != handshake.protocol_version {
            self.close();
            return Err(WrapperError::transport(
                op,
                format!(
                    "plugin negotiated protocol version {}, expected {}",
                    reply.protocol_version, handshake.protocol_version
                ),
            ));
        }

        let mut services = Vec::with_capacity(reply.services.len());
        for name in &reply.services {
            match ServiceKind::from_name(name) {
                Some(service) => services.push(service),
                None => tracing::warn!(service = %name, "ignoring unknown advertised service"),
            }
        }
        if !services.contains(&ServiceKind::Wrapping) {
            self.close();
            return Err(WrapperError::transport(op, "plugin does not serve wrapping"));
        }

        Ok(CapabilitySet::from_services(services))
    }

    /// Send `request` under `ctx` and return the reply payload.
    ///
    /// Error replies are rebuilt into the [`WrapperError`] variant the server
    /// produced.
    pub async fn call(
        &self,
        ctx: &CallContext,
        op: &str,
        request: Payload,
    ) -> Result<Payload, WrapperError> {
        let exchange = self.exchange(op, request).with_subscriber(self.dispatch.clone());

        match ctx.run(op, exchange).await? {
            Payload::Error(err) => Err(err.into()),
            reply => Ok(reply),
        }
    }

    async fn exchange(&self, op: &str, request: Payload) -> Result<Payload, WrapperError> {
        let transport = |message: String| WrapperError::transport(op, message);

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = request.into_frame(request_id).map_err(|e| transport(e.to_string()))?;

        let mut buf = Vec::with_capacity(frame.encoded_len());
        frame.encode(&mut buf).map_err(|e| transport(e.to_string()))?;

        let (mut send, mut recv) =
            self.connection.open_bi().await.map_err(|e| transport(format!("open stream: {e}")))?;

        send.write_all(&buf).await.map_err(|e| transport(format!("write failed: {e}")))?;
        send.finish().map_err(|e| transport(format!("finish failed: {e}")))?;

        tracing::trace!(op, request_id, "request sent");

        let bytes = recv
            .read_to_end(MAX_FRAME_LEN)
            .await
            .map_err(|e| transport(format!("read failed: {e}")))?;
        let reply = Frame::decode(&bytes).map_err(|e| transport(e.to_string()))?;

        if reply.header.request_id() != request_id {
            return Err(transport(format!(
                "reply for request {} on stream of request {request_id}",
                reply.header.request_id()
            )));
        }

        Payload::from_frame(&reply).map_err(|e| transport(e.to_string()))
    }

    /// Remote plugin address.
    pub fn remote_address(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection; later calls fail with `Transport`.
    pub fn close(&self) {
        self.connection.close(VarInt::from_u32(CLOSE_CLIENT_DONE), b"done");
    }

    /// Wait for the close to reach the plugin.
    pub async fn wait_idle(&self) {
        self.endpoint.wait_idle().await;
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("remote", &self.connection.remote_address())
            .field("next_request_id", &self.next_request_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Error for a reply whose opcode does not answer the request.
pub(crate) fn unexpected_reply(op: &str, reply: &Payload) -> WrapperError {
    WrapperError::transport(op, format!("unexpected reply {}", reply.opcode().op_name()))
}
