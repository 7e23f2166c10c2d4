//! TLS setup for the control connection.
//!
//! Cast receivers present self-signed device certificates that do not chain
//! to any public root, so the default policy accepts whatever certificate the
//! receiver presents while still checking handshake signatures. Callers that
//! provision their own roots can opt into full verification.

use cast_core::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// How the receiver certificate is checked.
#[derive(Clone, Default)]
pub enum TlsPolicy {
    /// Accept the receiver's self-signed certificate.
    #[default]
    AcceptReceiverCertificates,
    /// Verify the certificate chain against the given roots.
    Verify(Arc<RootCertStore>),
}

impl fmt::Debug for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsPolicy::AcceptReceiverCertificates => f.write_str("AcceptReceiverCertificates"),
            TlsPolicy::Verify(roots) => write!(f, "Verify({} roots)", roots.len()),
        }
    }
}

/// Certificate verifier that trusts any receiver certificate.
#[derive(Debug)]
struct ReceiverCertVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for ReceiverCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build a rustls client configuration for `policy`.
pub fn client_config(policy: &TlsPolicy) -> Result<Arc<rustls::ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Connect(format!("TLS configuration: {}", e)))?;

    let config = match policy {
        TlsPolicy::AcceptReceiverCertificates => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ReceiverCertVerifier { provider }))
            .with_no_client_auth(),
        TlsPolicy::Verify(roots) => builder
            .with_root_certificates(Arc::clone(roots))
            .with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

/// Open TCP to `host:port` and complete the TLS handshake within `timeout`.
pub async fn connect_tls(
    host: &str,
    port: u16,
    policy: &TlsPolicy,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>> {
    let config = client_config(policy)?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Connect(format!("invalid server name {}: {}", host, e)))?;

    let handshake = async {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| Error::Connect(format!("TCP connect to {}:{}: {}", host, port, e)))?;
        let _ = tcp.set_nodelay(true);
        debug!("TCP connected to {}:{}, starting TLS", host, port);
        TlsConnector::from(config)
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Connect(format!("TLS handshake with {}: {}", host, e)))
    };

    tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| Error::Connect(format!("timed out connecting to {}:{}", host, port)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_accepts_receiver_certificates() {
        assert!(matches!(
            TlsPolicy::default(),
            TlsPolicy::AcceptReceiverCertificates
        ));
    }

    #[test]
    fn both_policies_build_configs() {
        assert!(client_config(&TlsPolicy::AcceptReceiverCertificates).is_ok());
        let roots = Arc::new(RootCertStore::empty());
        assert!(client_config(&TlsPolicy::Verify(roots)).is_ok());
    }

    #[test]
    fn policy_debug_hides_roots() {
        let policy = TlsPolicy::Verify(Arc::new(RootCertStore::empty()));
        assert_eq!(format!("{:?}", policy), "Verify(0 roots)");
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        // bind then drop to get a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = connect_tls(
            "127.0.0.1",
            port,
            &TlsPolicy::default(),
            Duration::from_secs(2),
        )
        .await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let result = connect_tls(
            "127.0.0.1",
            port,
            &TlsPolicy::default(),
            Duration::from_millis(200),
        )
        .await;
        assert!(matches!(result, Err(Error::Connect(msg)) if msg.contains("timed out")));
    }
}
