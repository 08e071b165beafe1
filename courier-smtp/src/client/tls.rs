//! TLS client configuration for STARTTLS upgrades.
//!
//! Outbound mail uses opportunistic TLS: the verified configuration is tried
//! first and, because many MX hosts present self-signed or mismatched
//! certificates, an accept-all configuration exists for a second attempt.

use std::sync::{Arc, LazyLock};

use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error, RootCertStore, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use tracing::warn;

static VERIFIED: LazyLock<Arc<ClientConfig>> = LazyLock::new(|| {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    if !certs.errors.is_empty() {
        warn!(?certs.errors, "Some certificates could not be loaded");
    }
    let (_, ignored) = root_store.add_parsable_certificates(certs.certs);
    if ignored > 0 {
        warn!(ignored, "Some system certificates could not be parsed");
    }

    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
});

static INSECURE: LazyLock<Arc<ClientConfig>> = LazyLock::new(|| {
    let mut config = ClientConfig::builder()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    config
        .dangerous()
        .set_certificate_verifier(Arc::new(NoVerifier));

    Arc::new(config)
});

/// Returns the client configuration to use for a handshake.
///
/// With `verify` unset the server certificate is not checked at all.
pub fn client_config(verify: bool) -> Arc<ClientConfig> {
    if verify {
        Arc::clone(&VERIFIED)
    } else {
        Arc::clone(&INSECURE)
    }
}

/// A certificate verifier that accepts all certificates.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
