//! Crate-wide error taxonomy for the proxy engine.
//!
//! The donor crates (`httproxy`, `rproxy`) thread `anyhow::Result` end to
//! end; embedders of a library seam benefit from a matchable type instead,
//! so this crate defines `ProxyError` for the public API and only falls
//! back to `anyhow` at the binary boundary (`init`, `main`).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to bind listen socket on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("proxy is already running")]
    AlreadyStarted,

    #[error("proxy is not running")]
    NotRunning,

    #[error("failed to connect upstream {host}:{port}: {source}")]
    UpstreamConnect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("failed to load TLS material: {0}")]
    TlsMaterial(String),

    #[error("malformed request: {0}")]
    ProtocolParse(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Error returned by a user-supplied `transform` closure. Per the chain
/// evaluation contract, a transform error never aborts the chain: it is
/// logged and the rule is treated as a no-op, evaluation continuing with
/// the unmodified field.
#[derive(Debug, thiserror::Error)]
#[error("transform rule failed: {0}")]
pub struct TransformError(pub String);
