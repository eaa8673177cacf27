//! The acceptor and lifecycle state machine (§4.1), generalizing
//! `httproxy::start::handle_local_target` into a `start`/`stop` pair a
//! test harness can drive instead of a function that runs until the
//! process shuts down. The accept loop's own shutdown gate is the same
//! atomic-flag-plus-condvar shape `httproxy::init::shutdown::GracefulShutdown`
//! uses, scoped to one `Proxy` instance instead of the whole process.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use mea::condvar::Condvar;
use mea::mutex::Mutex as AsyncMutex;
use smol::net::{TcpListener, TcpStream};

use crate::dispatcher;
use crate::error::{ProxyError, Result};
use crate::forward;
use crate::interceptor::{Interceptor, Outcome};
use crate::prefixed::Prefixed;
use crate::registry::ConnectionRegistry;
use crate::tls::TlsMaterial;

const STATE_NEW: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Public start/stop state, `New -> Running -> Stopped`, guarding against
/// double-`start` and double-`stop` calls.
struct LifecycleState {
    value: AtomicU8,
}

impl LifecycleState {
    fn new() -> Self {
        Self {
            value: AtomicU8::new(STATE_NEW),
        }
    }

    fn begin_start(&self) -> Result<()> {
        self.value
            .compare_exchange(STATE_NEW, STATE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ProxyError::AlreadyStarted)
    }

    fn stop(&self) -> Result<()> {
        self.value
            .compare_exchange(STATE_RUNNING, STATE_STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ProxyError::NotRunning)
    }
}

/// Wakes the accept loop so it can drop its listener and return, the same
/// wait/notify shape `GracefulShutdown` uses for draining in-flight work.
struct ShutdownGate {
    shutting_down: AtomicBool,
    gate: AsyncMutex<()>,
    cv: Condvar,
}

impl ShutdownGate {
    fn new() -> Self {
        Self {
            shutting_down: AtomicBool::new(false),
            gate: AsyncMutex::new(()),
            cv: Condvar::new(),
        }
    }

    fn initiate(&self) {
        if self.shutting_down.swap(true, Ordering::Release) {
            return;
        }
        self.cv.notify_all();
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    async fn wait_shutting_down(&self) {
        if self.is_shutting_down() {
            return;
        }
        let mut guard = self.gate.lock().await;
        while !self.is_shutting_down() {
            guard = self.cv.wait(guard).await;
        }
    }
}

/// A configured proxy. Build one with `Proxy::builder`, then `start` it to
/// begin accepting connections.
const DEFAULT_BACKLOG: i32 = 1024;

pub struct Proxy {
    addr: SocketAddr,
    backlog: i32,
    registry: ConnectionRegistry,
    interceptor: Option<Arc<Interceptor>>,
    tls: Option<Arc<TlsMaterial>>,
    lifecycle: LifecycleState,
    shutdown: Arc<ShutdownGate>,
    bound_addr: std::sync::Mutex<Option<SocketAddr>>,
}

/// Builder for `Proxy`, mirroring the declarative construction style
/// `ChainBuilder`/`InterceptorBuilder` use elsewhere in this crate.
#[derive(Default)]
pub struct ProxyBuilder {
    addr: Option<SocketAddr>,
    backlog: Option<i32>,
    interceptor: Option<Interceptor>,
    tls: Option<TlsMaterial>,
}

impl ProxyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// The listen socket's pending-connection backlog. Defaults to 1024.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    pub fn interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn build(self) -> Proxy {
        Proxy {
            addr: self.addr.unwrap_or_else(|| "127.0.0.1:8080".parse().unwrap()),
            backlog: self.backlog.unwrap_or(DEFAULT_BACKLOG),
            registry: ConnectionRegistry::new(),
            interceptor: self.interceptor.map(Arc::new),
            tls: self.tls.map(Arc::new),
            lifecycle: LifecycleState::new(),
            shutdown: Arc::new(ShutdownGate::new()),
            bound_addr: std::sync::Mutex::new(None),
        }
    }
}

impl Proxy {
    pub fn builder() -> ProxyBuilder {
        ProxyBuilder::new()
    }

    /// Bind the listen socket (with `SO_REUSEADDR`, via `socket2`) and
    /// spawn the accept loop as a detached task. Returns once the socket
    /// is listening, not once the server exits.
    pub async fn start(&self) -> Result<SocketAddr> {
        self.lifecycle.begin_start()?;

        let socket = socket2::Socket::new(
            socket2::Domain::for_address(self.addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;
        socket
            .set_reuse_address(true)
            .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;
        socket
            .bind(&self.addr.into())
            .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;
        socket
            .listen(self.backlog)
            .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::try_from(std_listener)
            .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ProxyError::Bind { addr: self.addr, source })?;

        log::info!("mitmdriver listening on {local_addr}");
        *self.bound_addr.lock().expect("bound_addr mutex poisoned") = Some(local_addr);

        let registry = self.registry.clone();
        let interceptor = self.interceptor.clone();
        let tls = self.tls.clone();
        let shutdown = self.shutdown.clone();

        smol::spawn(async move {
            accept_loop(listener, registry, interceptor, tls, shutdown).await;
        })
        .detach();

        Ok(local_addr)
    }

    /// Close every tracked connection, wake the accept loop so it drops
    /// the listen socket, and mark the proxy stopped. Idempotent: a
    /// second call returns `ProxyError::NotRunning` rather than panicking.
    pub async fn stop(&self) -> Result<()> {
        self.lifecycle.stop()?;
        self.registry.close_all().await;
        self.shutdown.initiate();
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().expect("bound_addr mutex poisoned")
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: ConnectionRegistry,
    interceptor: Option<Arc<Interceptor>>,
    tls: Option<Arc<TlsMaterial>>,
    shutdown: Arc<ShutdownGate>,
) {
    loop {
        let accepted = {
            let accept_fut = async { listener.accept().await.map(Some) };
            let shutdown_fut = async {
                shutdown.wait_shutting_down().await;
                Ok(None)
            };
            smol::future::or(accept_fut, shutdown_fut).await
        };

        let (stream, peer) = match accepted {
            Ok(Some(pair)) => pair,
            Ok(None) => break,
            Err(err) => {
                log::warn!("accept failed: {err}");
                continue;
            }
        };

        let registry = registry.clone();
        let interceptor = interceptor.clone();
        let tls = tls.clone();
        smol::spawn(async move {
            if let Err(err) = handle_connection(stream, peer, registry, interceptor, tls).await {
                log::warn!("peer={peer} error: {err}");
            }
        })
        .detach();
    }
    // `listener` drops here, releasing the bound port.
}

async fn handle_connection(
    mut client: TcpStream,
    peer: SocketAddr,
    registry: ConnectionRegistry,
    interceptor: Option<Arc<Interceptor>>,
    tls: Option<Arc<TlsMaterial>>,
) -> Result<()> {
    use futures_lite::io::AsyncWriteExt;

    let parsed = match dispatcher::read_request(&mut client).await {
        Ok(parsed) => parsed,
        Err(err) => {
            // §7(6): a protocol parse error is logged and the connection is
            // closed with no response, not surfaced as a user-visible reply.
            log::debug!("peer={peer} malformed request: {err}");
            return Ok(());
        }
    };

    if parsed.message.method.eq_ignore_ascii_case("CONNECT") {
        let (host, port) = dispatcher::connect_target(&parsed.message)?;

        let upstream = match TcpStream::connect((host.as_str(), port)).await {
            Ok(s) => s,
            Err(source) => {
                write_plain_error(&mut client, 502, "Bad Gateway", "CONNECT failed").await?;
                return Err(ProxyError::UpstreamConnect { host, port, source });
            }
        };
        registry.connect(&host, port, upstream.clone()).await;

        client
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await?;
        client.flush().await?;

        let client_stream = Prefixed::new(Vec::new(), client);
        let upstream_stream = Prefixed::new(parsed.trailing, upstream);

        let result = match (&interceptor, &tls) {
            (Some(interceptor), Some(tls)) => {
                run_mediated_tunnel(interceptor.clone(), client_stream, upstream_stream, tls.clone(), &host)
                    .await
            }
            _ => forward::tunnel(client_stream, upstream_stream).await.map(|_| ()),
        };

        registry.disconnect(&host, port).await;
        return result;
    }

    let (host, port) = dispatcher::target_of(&parsed.message)?;
    match &interceptor {
        Some(interceptor) => match interceptor.run_direct(parsed.message).await {
            Ok(Outcome::Responded(response)) => {
                client.write_all(&response.to_bytes()).await?;
                client.flush().await?;
            }
            Ok(Outcome::Dropped) => {}
            Err(err) => {
                write_plain_error(&mut client, 502, "Bad Gateway", &err.to_string()).await?;
            }
        },
        None => {
            // No interceptor: raw-forward (§4.2, §4.4). Re-serializing and
            // relaying through the external HTTP client here would violate
            // P2's octet-identity guarantee, since that client canonicalizes
            // headers and re-derives framing — it exists for the
            // interceptor path only (§4.6).
            let upstream = match TcpStream::connect((host.as_str(), port)).await {
                Ok(s) => s,
                Err(source) => {
                    write_plain_error(&mut client, 502, "Bad Gateway", "upstream connect failed").await?;
                    return Err(ProxyError::UpstreamConnect { host, port, source });
                }
            };
            let request_bytes = parsed.message.to_bytes();
            let client_stream = Prefixed::new(Vec::new(), client);
            let mut upstream_stream = Prefixed::new(Vec::new(), upstream);
            upstream_stream.write_all(&request_bytes).await?;
            upstream_stream.flush().await?;
            forward::tunnel(client_stream, upstream_stream).await?;
            return Ok(());
        }
    }
    log::debug!("peer={peer} handled origin {host}:{port}");
    Ok(())
}

/// A CONNECT tunnel with an interceptor and TLS material configured: both
/// legs are TLS-terminated and the plaintext HTTP exchanged between them
/// runs through the interceptor's chains (§4.5 + §4.3 together).
async fn run_mediated_tunnel<C, U>(
    interceptor: Arc<Interceptor>,
    client: Prefixed<C>,
    upstream: Prefixed<U>,
    tls: Arc<TlsMaterial>,
    host: &str,
) -> Result<()>
where
    C: futures_lite::io::AsyncRead + futures_lite::io::AsyncWrite + Unpin + Send + 'static,
    U: futures_lite::io::AsyncRead + futures_lite::io::AsyncWrite + Unpin + Send + 'static,
{
    let client_tls = tls.accept_client(client).await?;
    let origin_tls = tls.connect_origin(upstream, host).await?;
    crate::interceptor::run_tunnel(&interceptor, client_tls, origin_tls).await
}

async fn write_plain_error(stream: &mut TcpStream, status: u16, reason: &str, body: &str) -> Result<()> {
    use futures_lite::io::AsyncWriteExt;
    let body = format!("{body}\n");
    let bytes = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(bytes.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
