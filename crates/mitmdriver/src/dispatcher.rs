//! Parses exactly one HTTP/1.1 request off a client stream and derives its
//! routing target, generalizing `httproxy::start::read_client_request` /
//! `build_target_url`.

use httparse::Header;
use smol::io::AsyncReadExt;

use crate::error::{ProxyError, Result};
use crate::message::{RequestMessage, ResponseMessage};

const MAX_HEADER_BYTES: usize = 32 * 1024;
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// A parsed request plus any bytes read past the header terminator that
/// are not part of its body (e.g. the start of a TLS ClientHello riding
/// along with a `CONNECT` request in the same TCP segment).
pub struct ParsedRequest {
    pub message: RequestMessage,
    pub trailing: Vec<u8>,
}

/// Read one HTTP/1.1 request from `stream`. Tolerates the `Date` header's
/// occasionally-malformed shape by never attempting to parse it as a
/// calendar value — it is carried as an opaque string like every other
/// header.
pub async fn read_request<S>(stream: &mut S) -> Result<ParsedRequest>
where
    S: AsyncReadExt + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        let n = stream
            .read(&mut tmp)
            .await
            .map_err(ProxyError::Io)?;
        if n == 0 {
            return Err(ProxyError::ProtocolParse("peer closed before headers completed".into()));
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.len() > MAX_HEADER_BYTES {
            return Err(ProxyError::ProtocolParse("request headers too large".into()));
        }
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = &buf[..header_end];

    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers_buf);
    match req
        .parse(head)
        .map_err(|e| ProxyError::ProtocolParse(e.to_string()))?
    {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(ProxyError::ProtocolParse("incomplete request headers".into()));
        }
    }

    let method = req
        .method
        .ok_or_else(|| ProxyError::ProtocolParse("missing method".into()))?
        .to_string();
    let uri = req
        .path
        .ok_or_else(|| ProxyError::ProtocolParse("missing request target".into()))?
        .to_string();
    let version = match req.version {
        Some(1) => "HTTP/1.1".to_string(),
        Some(0) => "HTTP/1.0".to_string(),
        _ => "HTTP/1.1".to_string(),
    };

    let headers: Vec<(String, String)> = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).to_string()))
        .collect();

    let pre_body = buf[header_end..].to_vec();

    if method.eq_ignore_ascii_case("CONNECT") {
        return Ok(ParsedRequest {
            message: RequestMessage {
                method,
                uri,
                version,
                headers,
                body: Vec::new(),
            },
            trailing: pre_body,
        });
    }

    if header_has_value(req.headers, "transfer-encoding", "chunked") {
        return Err(ProxyError::ProtocolParse("chunked request body not supported".into()));
    }

    let content_length = parse_content_length(req.headers)?;
    let body = if let Some(len) = content_length {
        if len > MAX_BODY_BYTES {
            return Err(ProxyError::ProtocolParse(format!("request body too large: {len} bytes")));
        }
        let mut body = pre_body;
        while body.len() < len {
            let n = stream.read(&mut tmp).await.map_err(ProxyError::Io)?;
            if n == 0 {
                return Err(ProxyError::ProtocolParse("peer closed while reading body".into()));
            }
            body.extend_from_slice(&tmp[..n]);
        }
        body.truncate(len);
        body
    } else {
        Vec::new()
    };

    Ok(ParsedRequest {
        message: RequestMessage {
            method,
            uri,
            version,
            headers,
            body,
        },
        trailing: Vec::new(),
    })
}

fn parse_content_length(headers: &[Header<'_>]) -> Result<Option<usize>> {
    let Some(h) = headers.iter().find(|h| h.name.eq_ignore_ascii_case("content-length")) else {
        return Ok(None);
    };
    let s = std::str::from_utf8(h.value)
        .map_err(|e| ProxyError::ProtocolParse(e.to_string()))?
        .trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|_| ProxyError::ProtocolParse(format!("invalid Content-Length: {s}")))
}

fn header_has_value(headers: &[Header<'_>], name: &str, expected: &str) -> bool {
    headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case(name)
            && std::str::from_utf8(h.value)
                .ok()
                .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
    })
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one HTTP/1.1 response off `stream`, used when the interceptor
/// talks to the origin directly over an already-mediated TLS tunnel
/// instead of through the blocking external HTTP client (§4.3's
/// `run_tunnel`).
///
/// Chunked bodies are fully decoded and buffered before this returns —
/// the spec leaves the response chain's interaction with chunked transfer
/// encoding to the implementer, and buffering keeps the chain evaluator
/// (which rewrites whole field values) simple and correct rather than
/// inventing a streaming rewrite contract.
pub async fn read_response<S>(stream: &mut S) -> Result<ResponseMessage>
where
    S: AsyncReadExt + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut tmp).await.map_err(ProxyError::Io)?;
        if n == 0 {
            return Err(ProxyError::ProtocolParse("peer closed before response headers completed".into()));
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.len() > MAX_HEADER_BYTES {
            return Err(ProxyError::ProtocolParse("response headers too large".into()));
        }
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = &buf[..header_end];
    let mut headers_buf = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut headers_buf);
    match resp
        .parse(head)
        .map_err(|e| ProxyError::ProtocolParse(e.to_string()))?
    {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => {
            return Err(ProxyError::ProtocolParse("incomplete response headers".into()));
        }
    }

    let status = resp
        .code
        .ok_or_else(|| ProxyError::ProtocolParse("missing status code".into()))?;
    let reason = resp.reason.unwrap_or("").to_string();
    let version = match resp.version {
        Some(1) => "HTTP/1.1".to_string(),
        Some(0) => "HTTP/1.0".to_string(),
        _ => "HTTP/1.1".to_string(),
    };
    let headers: Vec<(String, String)> = resp
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).to_string()))
        .collect();

    let pre_body = buf[header_end..].to_vec();
    let chunked = header_has_value(resp.headers, "transfer-encoding", "chunked");
    let content_length = parse_content_length(resp.headers)?;

    let body = if chunked {
        read_chunked_body(stream, pre_body).await?
    } else if let Some(len) = content_length {
        if len > MAX_BODY_BYTES {
            return Err(ProxyError::ProtocolParse(format!("response body too large: {len} bytes")));
        }
        let mut body = pre_body;
        while body.len() < len {
            let n = stream.read(&mut tmp).await.map_err(ProxyError::Io)?;
            if n == 0 {
                return Err(ProxyError::ProtocolParse("peer closed while reading response body".into()));
            }
            body.extend_from_slice(&tmp[..n]);
        }
        body.truncate(len);
        body
    } else {
        // No Content-Length and not chunked: treated as a zero-length
        // body. A "read until close" response would otherwise prevent
        // the tunnel from ever reading the next request.
        pre_body
    };

    Ok(ResponseMessage {
        version,
        status,
        reason,
        headers,
        body,
    })
}

async fn read_chunked_body<S>(stream: &mut S, mut buf: Vec<u8>) -> Result<Vec<u8>>
where
    S: AsyncReadExt + Unpin,
{
    let mut tmp = [0u8; 4096];
    let mut body = Vec::new();

    loop {
        let line_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n") {
                break pos;
            }
            let n = stream.read(&mut tmp).await.map_err(ProxyError::Io)?;
            if n == 0 {
                return Err(ProxyError::ProtocolParse("peer closed mid chunk size".into()));
            }
            buf.extend_from_slice(&tmp[..n]);
        };

        let size_line = std::str::from_utf8(&buf[..line_end])
            .map_err(|e| ProxyError::ProtocolParse(e.to_string()))?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let chunk_size = usize::from_str_radix(size_str, 16)
            .map_err(|_| ProxyError::ProtocolParse(format!("invalid chunk size: {size_str}")))?;
        buf.drain(..line_end + 2);

        if chunk_size == 0 {
            // Trailers (if any) followed by a final CRLF; this proxy does
            // not surface trailers to the chain evaluator.
            while find_subslice(&buf, b"\r\n\r\n").is_none() {
                let n = stream.read(&mut tmp).await.map_err(ProxyError::Io)?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&tmp[..n]);
            }
            return Ok(body);
        }

        while buf.len() < chunk_size + 2 {
            let n = stream.read(&mut tmp).await.map_err(ProxyError::Io)?;
            if n == 0 {
                return Err(ProxyError::ProtocolParse("peer closed mid chunk data".into()));
            }
            buf.extend_from_slice(&tmp[..n]);
        }
        body.extend_from_slice(&buf[..chunk_size]);
        buf.drain(..chunk_size + 2);

        if body.len() > MAX_BODY_BYTES {
            return Err(ProxyError::ProtocolParse("response body too large".into()));
        }
    }
}

/// The `(host, port)` a non-CONNECT request should be routed to.
///
/// The request-target's path is never treated as a port number — see the
/// spec's open question about this apparent defect in the source this was
/// distilled from. Port is derived, in order, from: an explicit port in an
/// absolute-form URI, a port on the `Host` header, and finally the scheme
/// default (80 for `http`, 443 for `https`).
pub fn target_of(message: &RequestMessage) -> Result<(String, u16)> {
    if let Some(rest) = message.uri.strip_prefix("http://") {
        return split_authority(rest.split('/').next().unwrap_or(rest), 80);
    }
    if let Some(rest) = message.uri.strip_prefix("https://") {
        return split_authority(rest.split('/').next().unwrap_or(rest), 443);
    }

    let host_header = message
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| ProxyError::ProtocolParse("missing Host header for origin-form request".into()))?;
    split_authority(host_header, 80)
}

/// The `(host, port)` a `CONNECT host:port` request targets.
pub fn connect_target(message: &RequestMessage) -> Result<(String, u16)> {
    split_authority(&message.uri, 443)
}

fn split_authority(authority: &str, default_port: u16) -> Result<(String, u16)> {
    if let Some(rest) = authority.strip_prefix('[') {
        // IPv6 literal, e.g. "[::1]:443"
        let Some(end) = rest.find(']') else {
            return Err(ProxyError::ProtocolParse(format!("invalid IPv6 authority: {authority}")));
        };
        let host = format!("[{}]", &rest[..end]);
        let remainder = &rest[end + 1..];
        let port = match remainder.strip_prefix(':') {
            Some(p) => p
                .parse()
                .map_err(|_| ProxyError::ProtocolParse(format!("invalid port in {authority}")))?,
            None => default_port,
        };
        return Ok((host, port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            let port: u16 = port
                .parse()
                .map_err(|_| ProxyError::ProtocolParse(format!("invalid port in {authority}")))?;
            Ok((host.to_string(), port))
        }
        _ => Ok((authority.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(uri: &str, headers: Vec<(&str, &str)>) -> RequestMessage {
        RequestMessage {
            method: "GET".into(),
            uri: uri.into(),
            version: "HTTP/1.1".into(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: vec![],
        }
    }

    #[test]
    fn absolute_form_with_explicit_port() {
        let m = msg("http://example.com:8080/a", vec![]);
        assert_eq!(target_of(&m).unwrap(), ("example.com".to_string(), 8080));
    }

    #[test]
    fn absolute_form_defaults_to_scheme_port() {
        let m = msg("https://example.com/a", vec![]);
        assert_eq!(target_of(&m).unwrap(), ("example.com".to_string(), 443));
    }

    #[test]
    fn origin_form_uses_host_header_port() {
        let m = msg("/hello", vec![("Host", "example.com:9090")]);
        assert_eq!(target_of(&m).unwrap(), ("example.com".to_string(), 9090));
    }

    #[test]
    fn origin_form_path_is_never_mistaken_for_a_port() {
        // Regression for the spec's flagged open question: a bare numeric
        // path must not be interpreted as the target port.
        let m = msg("/8080", vec![("Host", "example.com")]);
        assert_eq!(target_of(&m).unwrap(), ("example.com".to_string(), 80));
    }

    #[test]
    fn connect_authority_without_port_defaults_to_443() {
        let m = msg("origin.test", vec![]);
        assert_eq!(connect_target(&m).unwrap(), ("origin.test".to_string(), 443));
    }

    #[test]
    fn connect_authority_with_ipv6_literal() {
        let m = msg("[::1]:8443", vec![]);
        assert_eq!(connect_target(&m).unwrap(), ("[::1]".to_string(), 8443));
    }
}
