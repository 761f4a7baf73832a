//! Self-signed TLS for the development/local QUIC listener.
//!
//! QUIC requires TLS 1.3; the router generates an ephemeral `rcgen`
//! certificate on startup rather than shipping one, matching the teacher's
//! already-present (if previously unused) `rcgen`/`rustls` dependencies.
//! A production deployment would load a real certificate instead — this
//! is the "insecure:"-prefixed local/dev path §6.1 describes on the agent
//! side.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// Builds a `quinn::ServerConfig` backed by a freshly generated self-signed
/// certificate for `subject_alt_names` (typically `["localhost"]` or a
/// loopback IP literal). Returns the config plus the DER-encoded cert, so
/// callers (tests, mainly) can pin it on the client side instead of
/// trusting any CA.
pub fn self_signed_server_config(
    subject_alt_names: Vec<String>,
) -> anyhow::Result<(quinn::ServerConfig, CertificateDer<'static>)> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(subject_alt_names)?;
    let cert_der = cert.der().clone();
    let key_der = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let server_config =
        quinn::ServerConfig::with_single_cert(vec![cert_der.clone()], key_der)?;
    Ok((server_config, cert_der))
}
