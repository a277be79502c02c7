//! Target resolution.
//!
//! Turns a request authority plus scheme into a dialable `host:port`.
//! Pure and deterministic: the same request always resolves to the same
//! address, and nothing is cached between requests.

use crate::error::{ProxyError, Result};

/// URL scheme of a proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Parse a URL scheme, case-insensitively.
    pub fn parse(scheme: &str) -> Option<Self> {
        if scheme.eq_ignore_ascii_case("http") {
            Some(Scheme::Http)
        } else if scheme.eq_ignore_ascii_case("https") {
            Some(Scheme::Https)
        } else {
            None
        }
    }

    /// Port used when the authority names none.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `host:port` ready to dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    addr: String,
    host_len: usize,
    port: u16,
}

impl ResolvedAddress {
    /// The full `host:port` string.
    pub fn as_str(&self) -> &str {
        &self.addr
    }

    /// Host part, including brackets for IPv6 literals.
    pub fn host(&self) -> &str {
        &self.addr[..self.host_len]
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.addr)
    }
}

/// Resolve `authority` (`host` or `host:port`) against `scheme`.
///
/// An explicit port is kept unchanged; otherwise 443 is appended for https
/// and 80 for http.
pub fn resolve_target(authority: &str, scheme: Scheme) -> Result<ResolvedAddress> {
    let authority = authority.trim();
    let (host, port) = split_authority(authority)?;

    if host.is_empty() {
        return Err(ProxyError::malformed(format!("empty host in authority '{}'", authority)));
    }
    if host
        .bytes()
        .any(|b| b.is_ascii_whitespace() || b == b'/' || b == b'@' || b.is_ascii_control())
    {
        return Err(ProxyError::malformed(format!("invalid host '{}'", host)));
    }

    match port {
        Some(port) => Ok(ResolvedAddress {
            addr: authority.to_string(),
            host_len: host.len(),
            port,
        }),
        None => {
            let port = scheme.default_port();
            Ok(ResolvedAddress {
                addr: format!("{}:{}", host, port),
                host_len: host.len(),
                port,
            })
        }
    }
}

/// Split an authority into host and optional port, validating the port.
fn split_authority(authority: &str) -> Result<(&str, Option<u16>)> {
    if authority.starts_with('[') {
        let end = authority.find(']').ok_or_else(|| {
            ProxyError::malformed(format!("unterminated IPv6 literal in '{}'", authority))
        })?;
        let host = &authority[..=end];
        let rest = &authority[end + 1..];
        if rest.is_empty() {
            return Ok((host, None));
        }
        let port = rest.strip_prefix(':').ok_or_else(|| {
            ProxyError::malformed(format!("unexpected text after IPv6 literal in '{}'", authority))
        })?;
        return Ok((host, Some(parse_port(port, authority)?)));
    }

    match authority.rsplit_once(':') {
        None => Ok((authority, None)),
        Some((host, _)) if host.contains(':') => Err(ProxyError::malformed(format!(
            "IPv6 literal must be bracketed in '{}'",
            authority
        ))),
        Some((host, port)) => Ok((host, Some(parse_port(port, authority)?))),
    }
}

fn parse_port(port: &str, authority: &str) -> Result<u16> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProxyError::malformed(format!("invalid port in authority '{}'", authority)));
    }
    port.parse::<u16>().map_err(|_| {
        ProxyError::malformed(format!("port out of range in authority '{}'", authority))
    })
}
