//! Router dial (new-transport mode, §4.2/§6.3): opens a QUIC connection,
//! opens a fresh bidirectional stream, and sends the Init frame.
//!
//! TLS setup is grounded on the client-crypto-config pattern used for QUIC
//! dialing elsewhere in the corpus: verified-by-default, with an
//! `insecure:`-gated skip-verification path for local development.

use quinn::crypto::rustls::QuicClientConfig;
use quinn::{ClientConfig, Endpoint};
use rustls::client::danger::{ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::net::SocketAddr;
use std::sync::Arc;
use tunnel_protocol::frame::write_frame;
use tunnel_protocol::message::InitMessage;
use tunnel_protocol::tunnel::Tunnel;

use crate::error::{DialTarget, ForwarderError, Result};

pub type QuicTunnel = Tunnel<quinn::RecvStream, quinn::SendStream>;

/// Dials `router_address` (already stripped of any `insecure:` prefix) and
/// sends `init` as frame 1 on a fresh bidirectional stream.
pub async fn dial_router(
    router_address: &str,
    insecure: bool,
    init: &InitMessage,
) -> Result<QuicTunnel> {
    let remote = resolve(router_address)
        .await
        .map_err(|e| ForwarderError::dial_msg(DialTarget::Router, e))?;

    let client_cfg =
        client_config(insecure).map_err(|e| ForwarderError::dial_msg(DialTarget::Router, e))?;

    let bind: SocketAddr = "0.0.0.0:0".parse().unwrap();
    let mut endpoint =
        Endpoint::client(bind).map_err(|e| ForwarderError::dial(DialTarget::Router, e))?;
    endpoint.set_default_client_config(client_cfg);

    let connecting = endpoint
        .connect(remote, "localhost")
        .map_err(|e| ForwarderError::dial(DialTarget::Router, e))?;
    let connection = connecting
        .await
        .map_err(|e| ForwarderError::dial(DialTarget::Router, e))?;

    let (mut send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| ForwarderError::dial(DialTarget::Router, e))?;

    let body = init
        .encode()
        .map_err(|e| ForwarderError::Protocol(e.to_string()))?;
    write_frame(&mut send, &body).await?;

    Ok(Tunnel::new(recv, send))
}

async fn resolve(addr: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(sa) = addr.parse::<SocketAddr>() {
        return Ok(sa);
    }
    let mut it = tokio::net::lookup_host(addr).await?;
    it.next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve router address {addr:?}"))
}

fn client_config(insecure: bool) -> anyhow::Result<ClientConfig> {
    let crypto = if insecure {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(SkipServerVerification::new())
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    Ok(ClientConfig::new(Arc::new(QuicClientConfig::try_from(
        crypto,
    )?)))
}

/// Dummy certificate verifier used only when the router address is
/// prefixed `insecure:`. Vulnerable to MITM; for local/dev use only.
#[derive(Debug)]
struct SkipServerVerification(Arc<rustls::crypto::CryptoProvider>);

impl SkipServerVerification {
    fn new() -> Arc<Self> {
        Arc::new(Self(Arc::new(rustls::crypto::ring::default_provider())))
    }
}

impl ServerCertVerifier for SkipServerVerification {
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
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
