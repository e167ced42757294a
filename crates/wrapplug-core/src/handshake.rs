//! Handshake descriptor and the plugin bootstrap line.
//!
//! The [`HandshakeConfig`] is checked twice: the cookie guards process
//! startup (an environment variable set by the host), and the full
//! descriptor is re-checked in-band by the first request on every connection.

use std::{fmt, net::SocketAddr, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD};
use wrapplug_proto::payloads::session::Hello;

use crate::WrapperError;

/// Environment variable carrying the host's supported protocol versions.
pub const PROTOCOL_VERSIONS_ENV: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Environment variable carrying the host's client certificate (base64 DER).
pub const CLIENT_CERT_ENV: &str = "PLUGIN_CLIENT_CERT";

/// Version of the bootstrap line format.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Immutable handshake descriptor shared by host and plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Name of the cookie environment variable
    pub cookie_key: String,
    /// Expected cookie value
    pub cookie_value: String,
    /// Application protocol version
    pub protocol_version: u32,
    /// Name the wrapper service is published under
    pub service_name: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            cookie_key: "HASHICORP_GKW_PLUGIN".to_string(),
            cookie_value: "wrapper".to_string(),
            protocol_version: 1,
            service_name: "wrapping".to_string(),
        }
    }
}

impl HandshakeConfig {
    /// In-band hello built from this descriptor.
    pub fn hello(&self) -> Hello {
        Hello {
            cookie_key: self.cookie_key.clone(),
            cookie_value: self.cookie_value.clone(),
            protocol_version: self.protocol_version,
            service_name: self.service_name.clone(),
        }
    }

    /// Check a peer's hello against this descriptor.
    ///
    /// # Errors
    ///
    /// `Transport` naming the first mismatching field.
    pub fn verify(&self, hello: &Hello) -> Result<(), WrapperError> {
        let mismatch = if hello.cookie_key != self.cookie_key {
            Some(format!("cookie key {:?} != {:?}", hello.cookie_key, self.cookie_key))
        } else if hello.cookie_value != self.cookie_value {
            Some("cookie value mismatch".to_string())
        } else if hello.protocol_version != self.protocol_version {
            Some(format!(
                "protocol version {} != {}",
                hello.protocol_version, self.protocol_version
            ))
        } else if hello.service_name != self.service_name {
            Some(format!("service {:?} != {:?}", hello.service_name, self.service_name))
        } else {
            None
        };

        match mismatch {
            Some(message) => Err(WrapperError::transport("handshake", message)),
            None => Ok(()),
        }
    }

    /// Whether the cookie value taken from the environment matches.
    pub fn cookie_matches(&self, value: Option<&str>) -> bool {
        value == Some(self.cookie_value.as_str())
    }

    /// Whether a comma-separated version list offers this protocol version.
    ///
    /// An absent list means the host did not negotiate and is accepted.
    pub fn accepts_versions(&self, versions: Option<&str>) -> bool {
        let Some(versions) = versions else {
            return true;
        };
        versions
            .split(',')
            .filter_map(|v| v.trim().parse::<u32>().ok())
            .any(|v| v == self.protocol_version)
    }

    /// Value for [`PROTOCOL_VERSIONS_ENV`] offering this descriptor's version.
    pub fn versions_env_value(&self) -> String {
        self.protocol_version.to_string()
    }
}

/// The single stdout line a plugin prints once it is listening.
///
/// Format: `CORE|APP_VERSION|NETWORK|ADDR|PROTOCOL|SERVER_CERT` with the
/// server certificate as standard base64 of its DER encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    /// Bootstrap line format version
    pub core_version: u32,
    /// Negotiated application protocol version
    pub app_version: u32,
    /// Network type
    pub network: String,
    /// Listening address
    pub addr: SocketAddr,
    /// Transport protocol
    pub protocol: String,
    /// Server certificate (DER)
    pub server_cert: Vec<u8>,
}

impl HandshakeLine {
    /// Line for a QUIC listener on `addr`.
    pub fn quic(app_version: u32, addr: SocketAddr, server_cert: Vec<u8>) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version,
            network: "udp".to_string(),
            addr,
            protocol: "quic".to_string(),
            server_cert,
        }
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.core_version,
            self.app_version,
            self.network,
            self.addr,
            self.protocol,
            STANDARD.encode(&self.server_cert)
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = WrapperError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| WrapperError::transport("handshake.parse", message);

        let parts: Vec<&str> = line.trim().split('|').collect();
        let [core, app, network, addr, protocol, cert] = parts.as_slice() else {
            return Err(invalid(format!("expected 6 fields, got {}", parts.len())));
        };

        let core_version: u32 =
            core.parse().map_err(|_| invalid(format!("bad core version {core:?}")))?;
        if core_version != CORE_PROTOCOL_VERSION {
            return Err(invalid(format!("unsupported core version {core_version}")));
        }

        Ok(Self {
            core_version,
            app_version: app.parse().map_err(|_| invalid(format!("bad app version {app:?}")))?,
            network: (*network).to_string(),
            addr: addr.parse().map_err(|_| invalid(format!("bad address {addr:?}")))?,
            protocol: (*protocol).to_string(),
            server_cert: STANDARD
                .decode(cert)
                .map_err(|e| invalid(format!("bad server certificate: {e}")))?,
        })
    }
}
