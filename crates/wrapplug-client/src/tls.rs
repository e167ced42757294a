//! Host side of automatic mutual TLS.
//!
//! The host generates its own throwaway certificate, hands it to the plugin
//! in the launch environment, and pins the certificate the plugin announces
//! in its handshake line.

use std::sync::Arc;

use rustls::{
    CertificateError, DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::WebPkiSupportedAlgorithms,
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime},
};
use wrapplug_core::WrapperError;
use wrapplug_proto::ALPN_PROTOCOL;

use crate::TransportConfig;

const OP: &str = "connect";

/// Ephemeral client certificate and key.
pub struct Identity {
    cert: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
}

impl Identity {
    /// Generate a fresh self-signed identity.
    pub fn generate() -> Result<Self, WrapperError> {
        let certified = rcgen::generate_simple_self_signed(vec!["wrapplug-host".to_string()])
            .map_err(|e| {
                WrapperError::configuration(OP, format!("failed to generate certificate: {e}"))
            })?;

        Ok(Self {
            cert: certified.cert.der().clone(),
            key: PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()),
        })
    }

    /// Certificate in DER form, as passed to the plugin.
    pub fn cert_der(&self) -> &[u8] {
        self.cert.as_ref()
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").field("cert_len", &self.cert.len()).finish_non_exhaustive()
    }
}

/// QUIC client config presenting `identity` and trusting only `server_cert`.
pub(crate) fn client_config(
    identity: &Identity,
    server_cert: &[u8],
    transport: &TransportConfig,
) -> Result<quinn::ClientConfig, WrapperError> {
    let invalid = |message: String| WrapperError::configuration(OP, message);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinnedServerVerifier {
        expected: CertificateDer::from(server_cert.to_vec()),
        algorithms: provider.signature_verification_algorithms,
    };

    let mut crypto = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| invalid(format!("invalid TLS versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_client_auth_cert(
            vec![identity.cert.clone()],
            PrivateKeyDer::from(identity.key.clone_key()),
        )
        .map_err(|e| invalid(format!("invalid TLS config: {e}")))?;

    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let mut config = quinn::ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| invalid(format!("QUIC config error: {e}")))?,
    ));

    let mut quic = quinn::TransportConfig::default();
    quic.max_idle_timeout(Some(
        transport
            .idle_timeout
            .try_into()
            .map_err(|e| invalid(format!("invalid idle timeout: {e}")))?,
    ));
    quic.keep_alive_interval(transport.keep_alive_interval);
    config.transport_config(Arc::new(quic));

    Ok(config)
}

/// Trusts exactly one server certificate.
#[derive(Debug)]
struct PinnedServerVerifier {
    expected: CertificateDer<'static>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.expected.as_ref() {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::warn!("plugin presented an unpinned certificate");
            Err(rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
