//! Request classification.
//!
//! # Responsibilities
//! - Read exactly one request head off the client socket
//! - Parse the request line and headers with `httparse`
//! - Derive the target authority, scheme and body framing
//! - Keep the raw head so the plain path can forward it verbatim
//!
//! # Design Decisions
//! - Only the first request on a connection is inspected; anything after
//!   the head is handed back untouched as the buffered prefix
//! - Head size and header count are bounded before parsing completes
//! - Ambiguous body framing is rejected rather than guessed

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::HttpConfig;
use crate::error::{ProxyError, Result};
use crate::upstream::{resolve_target, ResolvedAddress, Scheme};

/// The tunnel method.
pub const CONNECT: &str = "CONNECT";

const READ_CHUNK: usize = 4096;

/// How the request body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body (or the body is opaque tunnel payload for CONNECT).
    None,
    /// Exactly this many bytes follow the head.
    ContentLength(u64),
    /// `Transfer-Encoding: chunked`; the relay carries it verbatim.
    Chunked,
}

/// Which path the handler takes for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Connect,
    Forward,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Connect => "connect",
            RequestKind::Forward => "forward",
        }
    }
}

/// The first request read off a client connection. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    method: String,
    target: String,
    version: u8,
    headers: Vec<(String, Vec<u8>)>,
    authority: String,
    scheme: Scheme,
    body: BodyFraming,
    head: Vec<u8>,
}

impl ParsedRequest {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request-target exactly as sent.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Minor HTTP version (0 for HTTP/1.0, 1 for HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn kind(&self) -> RequestKind {
        if self.method == CONNECT {
            RequestKind::Connect
        } else {
            RequestKind::Forward
        }
    }

    pub fn is_connect(&self) -> bool {
        self.kind() == RequestKind::Connect
    }

    /// Target authority (`host` or `host:port`).
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn body(&self) -> BodyFraming {
        self.body
    }

    /// Raw request line and headers, including the terminating blank line.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Dialable `host:port` for this request.
    pub fn resolve(&self) -> Result<ResolvedAddress> {
        resolve_target(&self.authority, self.scheme)
    }
}

/// Reads and classifies the first request on a connection.
#[derive(Debug, Clone)]
pub struct RequestReader {
    max_head_bytes: usize,
    max_headers: usize,
}

impl RequestReader {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            max_head_bytes: config.max_head_bytes,
            max_headers: config.max_headers,
        }
    }

    /// Read one request head from `stream`.
    ///
    /// Returns the parsed request and any bytes read past the end of the
    /// head (body bytes, or early tunnel payload for CONNECT).
    pub async fn read<R>(&self, stream: &mut R) -> Result<(ParsedRequest, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(if buf.is_empty() {
                    ProxyError::malformed("connection closed before request")
                } else {
                    ProxyError::malformed("connection closed before end of request head")
                });
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some((head_len, request)) = parse_head(&buf, self.max_headers)? {
                if head_len > self.max_head_bytes {
                    return Err(self.head_too_large());
                }
                let buffered = buf.split_off(head_len);
                return Ok((request, buffered));
            }
            if buf.len() > self.max_head_bytes {
                return Err(self.head_too_large());
            }
        }
    }

    fn head_too_large(&self) -> ProxyError {
        ProxyError::malformed(format!("request head exceeds {} bytes", self.max_head_bytes))
    }
}

impl Default for RequestReader {
    fn default() -> Self {
        Self::new(&HttpConfig::default())
    }
}

/// Parse a request head from `buf`. `Ok(None)` means more bytes are needed.
pub fn parse_head(buf: &[u8], max_headers: usize) -> Result<Option<(usize, ParsedRequest)>> {
    let mut header_slots = vec![httparse::EMPTY_HEADER; max_headers];
    let mut req = httparse::Request::new(&mut header_slots);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(ProxyError::malformed(format!("invalid request head: {}", e))),
    };

    let method = req
        .method
        .ok_or_else(|| ProxyError::malformed("request method is missing"))?
        .to_string();
    let target = req
        .path
        .ok_or_else(|| ProxyError::malformed("request target is missing"))?
        .to_string();
    let version = req
        .version
        .ok_or_else(|| ProxyError::malformed("HTTP version is missing"))?;
    let headers: Vec<(String, Vec<u8>)> = req
        .headers
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect();

    let is_connect = method == CONNECT;
    let (authority, scheme) = if is_connect {
        connect_authority(&target)?
    } else {
        forward_authority(&target, &headers)?
    };
    let body = if is_connect {
        BodyFraming::None
    } else {
        body_framing(&headers)?
    };

    Ok(Some((
        head_len,
        ParsedRequest {
            method,
            target,
            version,
            headers,
            authority,
            scheme,
            body,
            head: buf[..head_len].to_vec(),
        },
    )))
}

/// CONNECT carries an authority-form target and no scheme; assume https.
fn connect_authority(target: &str) -> Result<(String, Scheme)> {
    if target.is_empty() || target.starts_with('/') || target.contains("://") {
        return Err(ProxyError::malformed(format!(
            "CONNECT target must be host:port, got '{}'",
            target
        )));
    }
    Ok((target.to_string(), Scheme::Https))
}

/// Absolute-form targets name the authority; origin-form falls back to Host.
fn forward_authority(target: &str, headers: &[(String, Vec<u8>)]) -> Result<(String, Scheme)> {
    if target.starts_with('/') || target == "*" {
        let host = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("host"))
            .map(|(_, value)| value)
            .ok_or_else(|| ProxyError::malformed("origin-form request without Host header"))?;
        let host = std::str::from_utf8(host)
            .map_err(|_| ProxyError::malformed("Host header is not valid UTF-8"))?
            .trim();
        return Ok((host.to_string(), Scheme::Http));
    }

    let url = url::Url::parse(target)
        .map_err(|e| ProxyError::malformed(format!("invalid request target '{}': {}", target, e)))?;
    let scheme = Scheme::parse(url.scheme())
        .ok_or_else(|| ProxyError::malformed(format!("unsupported scheme '{}'", url.scheme())))?;
    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::malformed(format!("request target '{}' has no host", target)))?;
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok((authority, scheme))
}

fn body_framing(headers: &[(String, Vec<u8>)]) -> Result<BodyFraming> {
    let transfer_encoding = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("transfer-encoding"));
    let mut content_length: Option<u64> = None;

    for (_, value) in headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
    {
        let text = std::str::from_utf8(value)
            .map_err(|_| ProxyError::malformed("Content-Length is not valid UTF-8"))?
            .trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProxyError::malformed(format!("invalid Content-Length '{}'", text)));
        }
        let parsed: u64 = text
            .parse()
            .map_err(|_| ProxyError::malformed(format!("invalid Content-Length '{}'", text)))?;
        match content_length {
            Some(existing) if existing != parsed => {
                return Err(ProxyError::malformed("conflicting Content-Length headers"));
            }
            _ => content_length = Some(parsed),
        }
    }

    if let Some((_, value)) = transfer_encoding {
        if content_length.is_some() {
            return Err(ProxyError::malformed(
                "both Transfer-Encoding and Content-Length are set",
            ));
        }
        let codings = String::from_utf8_lossy(value);
        let last = codings.rsplit(',').next().map(str::trim).unwrap_or("");
        if !last.eq_ignore_ascii_case("chunked") {
            return Err(ProxyError::malformed(format!(
                "unsupported Transfer-Encoding '{}'",
                codings.trim()
            )));
        }
        return Ok(BodyFraming::Chunked);
    }

    Ok(match content_length {
        Some(0) | None => BodyFraming::None,
        Some(len) => BodyFraming::ContentLength(len),
    })
}
