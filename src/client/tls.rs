//! TLS connector construction for the client pool.
//!
//! The TLS protocol itself is delegated to rustls; only the
//! handshake/verification lifecycle is modeled here: trusted roots come
//! from the configured CA bundle, and certificate verification can be
//! switched off for endpoints with self-signed certificates.

use anyhow::Context;
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::CryptoProvider;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig as TlsClientConfig, RootCertStore};

use crate::config::ClientConfig;

/// Builds the connector from pool configuration. Returns `None` when
/// SSL is disabled.
pub fn build_connector(cfg: &ClientConfig) -> anyhow::Result<Option<TlsConnector>> {
    if !cfg.ssl {
        return Ok(None);
    }

    let tls_config = if cfg.verify_certs {
        let mut roots = RootCertStore::empty();
        if let Some(path) = &cfg.ca_bundle {
            let pem = std::fs::read(path)
                .with_context(|| format!("failed to read CA bundle {}", path.display()))?;
            let mut reader = std::io::Cursor::new(pem);
            for cert in rustls_pemfile::certs(&mut reader) {
                roots
                    .add(cert.context("invalid certificate in CA bundle")?)
                    .context("rejected certificate in CA bundle")?;
            }
        }
        TlsClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        TlsClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerify::new()))
            .with_no_client_auth()
    };

    Ok(Some(TlsConnector::from(Arc::new(tls_config))))
}

/// Accepts any server certificate. Signature checks still run so the
/// handshake remains well-formed; only chain/hostname validation is
/// skipped.
#[derive(Debug)]
struct NoVerify {
    provider: CryptoProvider,
}

impl NoVerify {
    fn new() -> Self {
        Self {
            provider: rustls::crypto::aws_lc_rs::default_provider(),
        }
    }
}

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_ssl() {
        let cfg = ClientConfig::default();
        assert!(build_connector(&cfg).unwrap().is_none());
    }

    #[test]
    fn builds_with_verification_off() {
        let cfg = ClientConfig {
            ssl: true,
            verify_certs: false,
            ..ClientConfig::default()
        };
        assert!(build_connector(&cfg).unwrap().is_some());
        assert!(!NoVerify::new().supported_verify_schemes().is_empty());
    }
}
