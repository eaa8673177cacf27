//! On-the-fly TLS mediation (§4.5): one fixed certificate/key terminates
//! the client side; the origin side is a fresh TLS client connection
//! verified against the system trust store.
//!
//! Built on `rustls` + `futures-rustls` rather than the donor crates'
//! usual `tokio`-flavored TLS stack, so the engine stays on the same
//! `smol`/`futures-io` runtime `httproxy`/`rproxy` already use —
//! `futures-rustls` implements the `futures_io::{AsyncRead, AsyncWrite}`
//! traits `smol::net::TcpStream` also implements.

use std::sync::Arc;

use futures_lite::io::{AsyncRead, AsyncWrite};
use futures_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use futures_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use futures_rustls::{TlsAcceptor, TlsConnector};

use crate::error::{ProxyError, Result};

/// A single certificate/key pair read once at `Proxy` construction time.
/// No per-origin leaf minting: every client connection sees the same
/// certificate, which the embedder's client must already trust.
#[derive(Clone)]
pub struct TlsMaterial {
    server_config: Arc<ServerConfig>,
    client_config: Arc<ClientConfig>,
}

impl TlsMaterial {
    pub fn from_pem_files(cert_path: &std::path::Path, key_path: &std::path::Path) -> Result<Self> {
        let cert_bytes = std::fs::read(cert_path)
            .map_err(|e| ProxyError::TlsMaterial(format!("reading {}: {e}", cert_path.display())))?;
        let key_bytes = std::fs::read(key_path)
            .map_err(|e| ProxyError::TlsMaterial(format!("reading {}: {e}", key_path.display())))?;
        Self::from_pem_bytes(&cert_bytes, &key_bytes)
    }

    pub fn from_pem_bytes(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ProxyError::TlsMaterial(format!("parsing certificate PEM: {e}")))?;
        if certs.is_empty() {
            return Err(ProxyError::TlsMaterial("no certificate found in PEM".into()));
        }

        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
            .map_err(|e| ProxyError::TlsMaterial(format!("parsing private key PEM: {e}")))?
            .ok_or_else(|| ProxyError::TlsMaterial("no private key found in PEM".into()))?;

        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ProxyError::TlsMaterial(format!("building server TLS config: {e}")))?;

        let mut roots = RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            // Ignore individual malformed system roots rather than
            // failing the whole proxy over one bad entry.
            let _ = roots.add(cert);
        }

        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            server_config: Arc::new(server_config),
            client_config: Arc::new(client_config),
        })
    }

    /// Terminate client TLS on an already-accepted, already-`200`-replied
    /// stream. Generic over the underlying transport (rather than fixed to
    /// `smol::net::TcpStream`) so a `Prefixed<TcpStream>` carrying bytes
    /// read during CONNECT parsing can be handshaked over directly.
    pub async fn accept_client<S>(&self, stream: S) -> Result<futures_rustls::server::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let acceptor = TlsAcceptor::from(self.server_config.clone());
        acceptor
            .accept(stream)
            .await
            .map_err(|e| ProxyError::TlsHandshake(format!("client handshake: {e}")))
    }

    /// Open a fresh TLS connection to the origin, verifying its
    /// certificate against the system trust store and setting SNI to
    /// `host`.
    pub async fn connect_origin<S>(
        &self,
        stream: S,
        host: &str,
    ) -> Result<futures_rustls::client::TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let connector = TlsConnector::from(self.client_config.clone());
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ProxyError::TlsHandshake(format!("invalid SNI host {host}: {e}")))?;
        connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ProxyError::TlsHandshake(format!("origin handshake with {host}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CERT: &str = include_str!("../tests/fixtures/cert.pem");
    const TEST_KEY: &str = include_str!("../tests/fixtures/key.pem");

    #[test]
    fn loads_server_and_client_config_from_pem() {
        let material = TlsMaterial::from_pem_bytes(TEST_CERT.as_bytes(), TEST_KEY.as_bytes());
        assert!(material.is_ok());
    }

    #[test]
    fn rejects_empty_certificate() {
        let material = TlsMaterial::from_pem_bytes(b"", TEST_KEY.as_bytes());
        assert!(material.is_err());
    }
}
