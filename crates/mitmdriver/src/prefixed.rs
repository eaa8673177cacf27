//! A stream wrapper that replays bytes already consumed from the
//! underlying socket before any further reads reach it.
//!
//! `CONNECT` requests are frequently followed, in the very same TCP
//! segment, by the start of the client's TLS `ClientHello` (or, for raw
//! forwarding, arbitrary tunnel bytes). The dispatcher's header parser
//! reads in 4 KiB chunks and may slurp some of those bytes into its own
//! buffer while looking for the blank line that ends the request headers.
//! Those bytes must be replayed to whatever reads the stream next — the
//! TLS acceptor or the raw byte pump — or the origin never sees the start
//! of the handshake/tunnel.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_lite::io::{AsyncRead, AsyncWrite};

pub struct Prefixed<S> {
    prefix: VecDeque<u8>,
    inner: S,
}

impl<S> Prefixed<S> {
    pub fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix: VecDeque::from(prefix),
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Prefixed<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        if !self.prefix.is_empty() {
            let n = std::cmp::min(buf.len(), self.prefix.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.prefix.pop_front().expect("checked non-empty above");
            }
            return Poll::Ready(Ok(n));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Prefixed<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::io::AsyncReadExt;

    #[test]
    fn prefix_bytes_are_replayed_before_the_inner_stream() {
        smol::block_on(async {
            let inner = futures_lite::io::Cursor::new(b"world".to_vec());
            let mut stream = Prefixed::new(b"hello ".to_vec(), inner);
            let mut out = Vec::new();
            stream.read_to_end(&mut out).await.unwrap();
            assert_eq!(out, b"hello world");
        });
    }
}
