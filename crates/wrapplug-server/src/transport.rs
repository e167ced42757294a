//! Quinn-based QUIC listener.
//!
//! One request per bidirectional stream: the client writes a frame and
//! finishes its side, the server answers with one frame and finishes. The
//! first stream on every connection must carry a `Hello`; nothing is
//! dispatched until it has been accepted.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use quinn::{Connection, Endpoint, RecvStream, SendStream, VarInt};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use wrapplug_core::{CallContext, HandshakeConfig};
use wrapplug_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload, payloads::session::HelloReply,
};

use crate::{
    error::ServerError,
    registry::ServiceRegistry,
    tls::{self, Identity},
};

/// Close code sent when the handshake is rejected.
pub const CLOSE_HANDSHAKE_REJECTED: u32 = 1;

/// Close code sent on server shutdown.
pub const CLOSE_SHUTDOWN: u32 = 2;

const MAX_FRAME_LEN: usize = FrameHeader::SIZE + FrameHeader::MAX_PAYLOAD_SIZE as usize;

/// How long a rejected client gets to read the rejection before close.
const REJECT_LINGER: Duration = Duration::from_secs(1);

/// QUIC listener bound with the plugin's identity.
pub struct PluginListener {
    endpoint: Endpoint,
}

impl PluginListener {
    /// Bind a listener accepting only `client_cert`.
    pub fn bind(
        addr: SocketAddr,
        identity: &Identity,
        client_cert: Vec<u8>,
        idle_timeout: Duration,
    ) -> Result<Self, ServerError> {
        let server_config = tls::server_config(identity, client_cert, idle_timeout)?;

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }

    /// Accept connections until `shutdown` is cancelled or the endpoint closes.
    pub async fn serve(
        self,
        registry: Arc<ServiceRegistry>,
        handshake: HandshakeConfig,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        loop {
            let incoming = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                incoming = self.endpoint.accept() => incoming,
            };
            let Some(incoming) = incoming else {
                break;
            };

            let registry = Arc::clone(&registry);
            let handshake = handshake.clone();
            let shutdown = shutdown.child_token();

            let task = async move {
                let conn = match incoming.await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("connection failed: {}", e);
                        return;
                    },
                };
                let remote = conn.remote_address();
                tracing::debug!(%remote, "connection established");

                if let Err(e) = handle_connection(conn, registry, handshake, shutdown).await {
                    tracing::debug!(%remote, "connection ended: {}", e);
                }
            };
            tokio::spawn(task.with_current_subscriber());
        }

        self.endpoint.close(VarInt::from_u32(CLOSE_SHUTDOWN), b"shutdown");
        tracing::info!("listener stopped");
        Ok(())
    }
}

/// Handshake, then serve request streams until the connection closes.
async fn handle_connection(
    conn: Connection,
    registry: Arc<ServiceRegistry>,
    handshake: HandshakeConfig,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    accept_hello(&conn, &registry, &handshake).await?;

    let ctx = CallContext::with_cancellation(shutdown.clone());
    loop {
        let stream = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                conn.close(VarInt::from_u32(CLOSE_SHUTDOWN), b"shutdown");
                return Ok(());
            },
            stream = conn.accept_bi() => stream,
        };

        let (send, recv) = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("connection closed: {}", e);
                return Ok(());
            },
        };

        let registry = Arc::clone(&registry);
        let ctx = ctx.child();
        let task = async move {
            if let Err(e) = handle_stream(send, recv, &registry, &ctx).await {
                tracing::debug!("stream error: {}", e);
            }
        };
        tokio::spawn(task.with_current_subscriber());
    }
}

async fn accept_hello(
    conn: &Connection,
    registry: &ServiceRegistry,
    handshake: &HandshakeConfig,
) -> Result<(), ServerError> {
    let (mut send, mut recv) = conn
        .accept_bi()
        .await
        .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))?;

    let frame = read_frame(&mut recv).await?;
    let request_id = frame.header.request_id();

    let rejection = match Payload::from_frame(&frame) {
        Ok(Payload::Hello(hello)) => handshake.verify(&hello).err().map(|e| e.to_string()),
        Ok(other) => Some(format!("expected hello, got {}", other.opcode().op_name())),
        Err(e) => Some(format!("malformed hello: {e}")),
    };

    if let Some(reason) = rejection {
        tracing::warn!("handshake rejected: {}", reason);

        let reply = Payload::Error(ErrorPayload::handshake_rejected(reason.clone()));
        write_frame(&mut send, &reply.into_frame(request_id)?).await?;
        let _ = tokio::time::timeout(REJECT_LINGER, send.stopped()).await;

        conn.close(VarInt::from_u32(CLOSE_HANDSHAKE_REJECTED), b"handshake rejected");
        return Err(ServerError::Protocol(reason));
    }

    let reply = Payload::HelloReply(HelloReply {
        protocol_version: handshake.protocol_version,
        services: registry.services().into_iter().map(|s| s.name().to_string()).collect(),
    });
    write_frame(&mut send, &reply.into_frame(request_id)?).await?;

    tracing::debug!("handshake accepted");
    Ok(())
}

async fn handle_stream(
    mut send: SendStream,
    mut recv: RecvStream,
    registry: &ServiceRegistry,
    ctx: &CallContext,
) -> Result<(), ServerError> {
    let frame = read_frame(&mut recv).await?;
    let request_id = frame.header.request_id();
    let op = frame.header.opcode_enum().map_or("unknown", Opcode::op_name);

    let reply = match Payload::from_frame(&frame) {
        Ok(Payload::Hello(_)) => {
            Payload::Error(ErrorPayload::invalid_payload(op, "hello already accepted"))
        },
        Ok(request) => {
            tracing::debug!(op, request_id, "dispatching request");
            tokio::select! {
                reply = registry.dispatch(ctx, request) => reply,
                _ = send.stopped() => {
                    ctx.cancel();
                    tracing::debug!(op, request_id, "request abandoned by client");
                    return Ok(());
                },
            }
        },
        Err(e) => Payload::Error(ErrorPayload::invalid_payload(op, e.to_string())),
    };

    write_frame(&mut send, &reply.into_frame(request_id)?).await
}

/// Read the single frame carried by a request stream.
async fn read_frame(recv: &mut RecvStream) -> Result<Frame, ServerError> {
    let bytes = recv
        .read_to_end(MAX_FRAME_LEN)
        .await
        .map_err(|e| ServerError::Transport(format!("read failed: {e}")))?;

    Ok(Frame::decode(&bytes)?)
}

/// Write one frame and finish the stream.
async fn write_frame(send: &mut SendStream, frame: &Frame) -> Result<(), ServerError> {
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf)?;

    send.write_all(&buf).await.map_err(|e| ServerError::Transport(format!("write failed: {e}")))?;
    send.finish().map_err(|e| ServerError::Transport(format!("finish failed: {e}")))?;

    Ok(())
}
