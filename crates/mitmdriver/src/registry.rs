//! The connection registry (§4.7): a mapping from `host:port` to a live
//! connection record, serialized behind an async mutex the way
//! `httproxy::init::shutdown::GracefulShutdown` serializes its own gate
//! with `mea::mutex::Mutex`.

use std::collections::HashMap;
use std::sync::Arc;

use mea::mutex::Mutex;
use smol::net::TcpStream;

fn key(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// One open upstream TCP connection, tracked by the registry purely for
/// liveness/shutdown bookkeeping — the owning per-connection task still
/// has exclusive read/write access to the streams themselves.
struct Entry {
    stream: TcpStream,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new upstream connection for `host:port`. A prior entry for
    /// the same key (the client reconnecting to the same origin) is closed
    /// before being overwritten.
    pub async fn connect(&self, host: &str, port: u16, stream: TcpStream) {
        let mut guard = self.inner.lock().await;
        if let Some(old) = guard.insert(key(host, port), Entry { stream }) {
            let _ = old.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    /// Close and remove the entry for `host:port`, if present.
    pub async fn disconnect(&self, host: &str, port: u16) {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.remove(&key(host, port)) {
            let _ = entry.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    /// Close every tracked connection. Used by `Proxy::stop`.
    pub async fn close_all(&self) {
        let mut guard = self.inner.lock().await;
        for (_, entry) in guard.drain() {
            let _ = entry.stream.shutdown(std::net::Shutdown::Both);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
