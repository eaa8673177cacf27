//! The interceptor (§4.2-§4.3): an embedder-supplied pair of chains that
//! the proxy runs a request, and then a response, through before either
//! leaves the proxy.
//!
//! `run_direct` generalizes `httproxy::start::handle_client`'s non-CONNECT
//! branch (parse request, evaluate, forward via `upstream::send`,
//! evaluate response). `run_tunnel` is new: once a CONNECT has been
//! mediated with TLS (see `tls.rs`), the interceptor keeps one origin
//! connection open for the lifetime of the tunnel and speaks HTTP/1.1
//! directly over it rather than re-dialing through the blocking external
//! client per request, since a tunnel may carry more than one request.

use std::sync::Arc;

use futures_lite::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::chain::{self, Chain, Verdict};
use crate::dispatcher;
use crate::error::Result;
use crate::message::{Message, RequestMessage, ResponseMessage};
use crate::upstream;

/// The outcome of running one request/response pair through an
/// interceptor. `Dropped` carries no response: per invariant 4, a `drop`
/// verdict on the request chain skips both the upstream call and the
/// response chain entirely.
pub enum Outcome {
    Responded(ResponseMessage),
    Dropped,
}

#[derive(Clone, Default)]
pub struct Interceptor {
    request_chain: Arc<Chain>,
    response_chain: Arc<Chain>,
}

impl Interceptor {
    pub fn new(request_chain: Chain, response_chain: Chain) -> Self {
        Self {
            request_chain: Arc::new(request_chain),
            response_chain: Arc::new(response_chain),
        }
    }

    /// Evaluate the request chain, forward via the blocking external HTTP
    /// client on an accept, and evaluate the response chain — the path
    /// used for plain (non-CONNECT) requests, where the proxy owns the
    /// whole request/response exchange itself (§4.2, `handle_local_target`).
    pub async fn run_direct(&self, request: RequestMessage) -> Result<Outcome> {
        let (message, verdict) = chain::evaluate(&self.request_chain, Message::Request(request));
        let Verdict::Accept = verdict else {
            return Ok(Outcome::Dropped);
        };
        let request = message
            .into_request()
            .expect("chain::evaluate preserves the Message variant it was given");

        let response = upstream::send(request).await?;

        let (message, verdict) =
            chain::evaluate(&self.response_chain, Message::Response(response));
        let Verdict::Accept = verdict else {
            return Ok(Outcome::Dropped);
        };
        let response = message
            .into_response()
            .expect("chain::evaluate preserves the Message variant it was given");
        Ok(Outcome::Responded(response))
    }

    /// Run the request chain only, without contacting the origin or
    /// running the response chain — used by `run_tunnel` to decide
    /// whether to keep relaying a request that arrived over an
    /// already-mediated origin connection.
    pub fn evaluate_request(&self, request: RequestMessage) -> (RequestMessage, Verdict) {
        let (message, verdict) = chain::evaluate(&self.request_chain, Message::Request(request));
        let request = message
            .into_request()
            .expect("chain::evaluate preserves the Message variant it was given");
        (request, verdict)
    }

    pub fn evaluate_response(&self, response: ResponseMessage) -> (ResponseMessage, Verdict) {
        let (message, verdict) =
            chain::evaluate(&self.response_chain, Message::Response(response));
        let response = message
            .into_response()
            .expect("chain::evaluate preserves the Message variant it was given");
        (response, verdict)
    }
}

/// Run one TLS-mediated tunnel to completion: read each plaintext request
/// off `client`, run it through the interceptor, relay it to `origin`,
/// read the matching response back, run that through the interceptor too,
/// and write it to `client`. Exits cleanly when the client stream closes
/// or a chain returns `drop` (closing the tunnel with no response).
pub async fn run_tunnel<C, O>(interceptor: &Interceptor, mut client: C, mut origin: O) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let parsed = match dispatcher::read_request(&mut client).await {
            Ok(parsed) => parsed,
            Err(_) => return Ok(()), // client closed or sent garbage; tear down quietly
        };

        let (request, verdict) = interceptor.evaluate_request(parsed.message);
        if verdict == Verdict::Drop {
            return Ok(());
        }

        origin.write_all(&request.to_bytes()).await?;
        origin.flush().await?;

        let response = dispatcher::read_response(&mut origin).await?;
        let (response, verdict) = interceptor.evaluate_response(response);
        if verdict == Verdict::Drop {
            return Ok(());
        }

        client.write_all(&response.to_bytes()).await?;
        client.flush().await?;
    }
}
