//! The external HTTP client used by the interceptor to issue the
//! (possibly rewritten) upstream request (§4.6), generalized from
//! `httproxy::start::forward_via_ureq`.
//!
//! Unlike the donor, this client sends headers verbatim — including
//! hop-by-hop headers — because the spec for this component treats
//! hop-by-hop stripping as a concern for the chain evaluator (a rule can
//! `remove` `Connection`/`Proxy-Connection` if an embedder wants that),
//! not something the transport silently does on their behalf. The one
//! addition is injecting `Content-Length` when the message carries a body
//! but no length header at all, since otherwise the body could not be
//! sent; an existing (possibly now-stale, post-rewrite) value is never
//! overwritten.
//!
//! Body decoding is disabled, exactly like the donor's
//! `forward_via_ureq`: the request always asks for `identity` encoding
//! (overriding whatever `Accept-Encoding` the message carries) so the
//! origin has no reason to compress, and the response's
//! `Content-Encoding`/`Content-Length` are dropped in favor of a
//! `Content-Length` recomputed from the body actually relayed. Without
//! this, `ureq`'s bundled gzip/brotli support can transparently decode a
//! compressing origin's body while the stale `Content-Encoding`/
//! `Content-Length` headers ride along unchanged, corrupting the
//! response on the wire.

use crate::error::{ProxyError, Result};
use crate::message::{header_get, ResponseMessage};
use crate::message::RequestMessage;

/// Blocking-IO upstream request issued on a `smol::unblock` worker thread
/// so it never stalls the reactor the way calling `ureq` directly on an
/// executor thread would — the donor makes the same tradeoff for the same
/// reason.
pub async fn send(request: RequestMessage) -> Result<ResponseMessage> {
    smol::unblock(move || send_blocking(request)).await
}

fn send_blocking(request: RequestMessage) -> Result<ResponseMessage> {
    let mut builder = ureq::http::Request::builder()
        .method(request.method.as_str())
        .uri(request.uri.as_str());

    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("accept-encoding") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    // Force identity so the relayed body is exactly what the origin sent,
    // never transparently gzip/brotli-decoded out from under the
    // Content-Encoding/Content-Length headers we forward.
    builder = builder.header("accept-encoding", "identity");

    if header_get(&request.headers, "content-length").is_none()
        && header_get(&request.headers, "transfer-encoding").is_none()
        && !request.body.is_empty()
    {
        builder = builder.header("content-length", request.body.len().to_string());
    }

    let http_request = builder
        .body(request.body)
        .map_err(|e| ProxyError::ProtocolParse(format!("building upstream request: {e}")))?;

    let agent: ureq::Agent = ureq::config::Config::builder()
        .proxy(None)
        .max_redirects(0)
        .build()
        .into();

    let mut response = agent
        .run(http_request)
        .map_err(|e| ProxyError::UpstreamConnect {
            host: "upstream".to_string(),
            port: 0,
            source: std::io::Error::other(e.to_string()),
        })?;

    let status = response.status().as_u16();
    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("")
        .to_string();
    let version = format!("{:?}", response.version());

    // Content-Encoding/Content-Length describe the bytes `ureq` read off
    // the wire, not necessarily the bytes `read_to_vec` below hands back —
    // if the origin ignored our `identity` request and compressed anyway,
    // `ureq`'s bundled decoder already transparently decoded the body.
    // Drop both here and recompute Content-Length from the body actually
    // relayed, so the response written to the client is self-consistent
    // regardless of what the origin did.
    let mut headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter(|(k, _)| {
            let name = k.as_str();
            !name.eq_ignore_ascii_case("content-encoding") && !name.eq_ignore_ascii_case("content-length")
        })
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
        .collect();

    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| ProxyError::ProtocolParse(format!("reading upstream body: {e}")))?;

    headers.push(("Content-Length".to_string(), body.len().to_string()));

    Ok(ResponseMessage {
        version,
        status,
        reason,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_content_length_only_when_absent() {
        let with_body_no_len = RequestMessage {
            method: "POST".into(),
            uri: "http://example.invalid/".into(),
            version: "HTTP/1.1".into(),
            headers: vec![],
            body: b"hello".to_vec(),
        };
        assert!(header_get(&with_body_no_len.headers, "content-length").is_none());
    }
}
