//! Plugin process launcher.
//!
//! Starts the plugin binary with the handshake cookie, the offered protocol
//! versions and the host's client certificate in its environment, reads the
//! handshake line from its stdout, and connects.

use std::{process::Stdio, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
};
use wrapplug_core::{
    CapabilitySet, HandshakeLine, Wrapper, WrapperError,
    handshake::{CLIENT_CERT_ENV, PROTOCOL_VERSIONS_ENV},
};

use crate::{ClientOptions, Identity, WrapperProxy, connect};

const OP: &str = "plugin.launch";

/// A running plugin process and the proxy connected to it.
///
/// The process is killed when this value is dropped.
#[derive(Debug)]
pub struct PluginClient {
    child: Child,
    line: HandshakeLine,
    proxy: WrapperProxy,
}

impl PluginClient {
    /// Launch `command` as a plugin and connect to it.
    ///
    /// Stdout of the child is taken over for the handshake line; stderr is
    /// left as configured by the caller.
    ///
    /// # Errors
    ///
    /// `Transport` if the process fails to start, exits or stays silent past
    /// the connect timeout, prints a malformed handshake line, or refuses the
    /// connection. `CapabilityMismatch` as for [`connect`].
    pub async fn launch(
        mut command: Command,
        options: &ClientOptions,
    ) -> Result<Self, WrapperError> {
        let handshake = &options.handshake;
        let identity = Identity::generate()?;

        command
            .env(&handshake.cookie_key, &handshake.cookie_value)
            .env(PROTOCOL_VERSIONS_ENV, handshake.versions_env_value())
            .env(CLIENT_CERT_ENV, STANDARD.encode(identity.cert_der()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| WrapperError::transport(OP, format!("failed to start plugin: {e}")))?;
        tracing::debug!(pid = ?child.id(), "plugin process started");

        let timeout = options.transport.connect_timeout;
        let line = tokio::time::timeout(timeout, read_handshake_line(&mut child))
            .await
            .unwrap_or_else(|_| {
                Err(WrapperError::transport(OP, format!("no handshake line within {timeout:?}")))
            });
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            },
        };

        if line.protocol != "quic" || line.network != "udp" {
            let _ = child.kill().await;
            return Err(WrapperError::transport(
                OP,
                format!("unsupported transport {}/{}", line.network, line.protocol),
            ));
        }
        if line.app_version != handshake.protocol_version {
            let _ = child.kill().await;
            return Err(WrapperError::transport(
                OP,
                format!(
                    "plugin speaks protocol version {}, expected {}",
                    line.app_version, handshake.protocol_version
                ),
            ));
        }

        let proxy = match connect(line.addr, &line.server_cert, &identity, options).await {
            Ok(proxy) => proxy,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            },
        };

        Ok(Self { child, line, proxy })
    }

    /// Composed proxy for the plugin.
    pub fn proxy(&self) -> &WrapperProxy {
        &self.proxy
    }

    /// Proxy as a trait object.
    pub fn wrapper(&self) -> Arc<dyn Wrapper> {
        self.proxy.clone().into_wrapper()
    }

    /// Capability set the plugin advertised.
    pub fn capabilities(&self) -> CapabilitySet {
        self.proxy.capabilities()
    }

    /// Handshake line the plugin printed.
    pub fn handshake_line(&self) -> &HandshakeLine {
        &self.line
    }

    /// OS process id, while the process runs.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Close the connection and kill the plugin process.
    ///
    /// Calls on proxies obtained earlier fail with `Transport` afterwards.
    pub async fn kill(&mut self) -> Result<(), WrapperError> {
        self.proxy.close();
        self.child
            .kill()
            .await
            .map_err(|e| WrapperError::transport("plugin.kill", format!("kill failed: {e}")))
    }
}

async fn read_handshake_line(child: &mut Child) -> Result<HandshakeLine, WrapperError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| WrapperError::transport(OP, "plugin stdout is not piped"))?;

    let mut lines = BufReader::new(stdout).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| WrapperError::transport(OP, format!("reading handshake line: {e}")))?;

    match line {
        Some(line) => line.parse(),
        None => {
            let status = child
                .wait()
                .await
                .map_err(|e| WrapperError::transport(OP, format!("waiting for plugin: {e}")))?;
            Err(WrapperError::transport(OP, format!("plugin exited before handshake: {status}")))
        },
    }
}
