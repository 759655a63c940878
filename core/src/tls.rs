//! TLS transport and the certificate trust gate.
//!
//! # Design
//! Chain validation is delegated to rustls' webpki verifier. Its verdict is
//! passed, as `pre_verified`, to a `TrustPolicy` that has the final word. The
//! default policy returns the verdict unchanged. Accepting every certificate
//! is only reachable by naming `danger::AcceptAnyCertificate` explicitly or by
//! building with the `insecure-skip-verify` feature.
//!
//! Hostname matching is whatever webpki performs as part of chain
//! validation; no extra checks are layered on top.

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::NetError;
use crate::transport::{bare_host, Transport};

/// Per-connection certificate decision, invoked during the handshake.
pub trait TrustPolicy: fmt::Debug + Send + Sync {
    /// `pre_verified` is the outcome of standard chain validation for
    /// `certificate` (the server's end-entity certificate).
    fn verify(&self, pre_verified: bool, certificate: &CertificateDer<'_>) -> bool;
}

/// Accept exactly what chain validation accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictTrust;

impl TrustPolicy for StrictTrust {
    fn verify(&self, pre_verified: bool, _certificate: &CertificateDer<'_>) -> bool {
        pre_verified
    }
}

pub mod danger {
    use super::*;

    /// Accepts every certificate, valid or not. Disables server
    /// authentication entirely.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AcceptAnyCertificate;

    impl TrustPolicy for AcceptAnyCertificate {
        fn verify(&self, pre_verified: bool, _certificate: &CertificateDer<'_>) -> bool {
            if !pre_verified {
                log::warn!("accepting a certificate that failed verification");
            }
            true
        }
    }
}

/// The policy selected at build time.
pub fn default_trust_policy() -> Arc<dyn TrustPolicy> {
    #[cfg(feature = "insecure-skip-verify")]
    {
        log::warn!("built with insecure-skip-verify: server certificates are not checked");
        Arc::new(danger::AcceptAnyCertificate)
    }
    #[cfg(not(feature = "insecure-skip-verify"))]
    {
        Arc::new(StrictTrust)
    }
}

/// Mozilla's root set as shipped by `webpki-roots`.
pub fn default_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// rustls verifier that routes webpki's verdict through a `TrustPolicy`.
#[derive(Debug)]
pub struct GatedVerifier {
    inner: Arc<WebPkiServerVerifier>,
    policy: Arc<dyn TrustPolicy>,
}

impl GatedVerifier {
    pub fn new(
        roots: RootCertStore,
        provider: Arc<CryptoProvider>,
        policy: Arc<dyn TrustPolicy>,
    ) -> Result<Self, NetError> {
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| NetError::TransportFailed(format!("tls verifier setup: {e}")))?;
        Ok(Self { inner, policy })
    }
}

impl ServerCertVerifier for GatedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict =
            self.inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now);
        let pre_verified = verdict.is_ok();
        log::trace!(
            "verifying {} byte certificate for {server_name:?}: pre_verified={pre_verified}",
            end_entity.len()
        );

        if self.policy.verify(pre_verified, end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(verdict.err().unwrap_or_else(|| {
                rustls::Error::General("certificate rejected by trust policy".to_string())
            }))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// TLS over TCP, verified through a `GatedVerifier`.
#[derive(Clone)]
pub struct TlsTransport {
    connector: TlsConnector,
}

impl fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTransport").finish_non_exhaustive()
    }
}

impl TlsTransport {
    /// Webpki roots and the build-time default policy.
    pub fn new() -> Result<Self, NetError> {
        Self::with_roots(default_root_store(), default_trust_policy())
    }

    pub fn with_policy(policy: Arc<dyn TrustPolicy>) -> Result<Self, NetError> {
        Self::with_roots(default_root_store(), policy)
    }

    pub fn with_roots(roots: RootCertStore, policy: Arc<dyn TrustPolicy>) -> Result<Self, NetError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = GatedVerifier::new(roots, provider.clone(), policy)?;
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| NetError::TransportFailed(format!("tls config: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }
}

impl Transport for TlsTransport {
    type Stream = TlsStream<TcpStream>;

    const SECURE: bool = true;

    async fn establish(&self, tcp: TcpStream, host: &str) -> Result<Self::Stream, NetError> {
        let name = ServerName::try_from(bare_host(host).to_string())
            .map_err(|e| NetError::SslHandshakeIncomplete(format!("invalid server name {host:?}: {e}")))?;
        self.connector
            .connect(name, tcp)
            .await
            .map_err(|e| NetError::SslHandshakeIncomplete(e.to_string()))
    }
}
