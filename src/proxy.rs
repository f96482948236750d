//! Proxy identifiers and their protocols.

use crate::error::PoolError;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Protocols a pooled proxy may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        }
    }

    /// The `protocol://` prefix used to match identifiers in the store.
    pub fn prefix(&self) -> String {
        format!("{}://", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "socks4" => Ok(Protocol::Socks4),
            "socks5" => Ok(Protocol::Socks5),
            other => Err(PoolError::MalformedProxy(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `protocol://host:port` proxy identifier.
///
/// Equality is exact string match; `parse` only accepts lowercase protocol
/// prefixes, so callers feeding mixed-case input must normalize first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyId {
    raw: String,
    protocol: Protocol,
}

impl ProxyId {
    /// Parse and validate an identifier.
    pub fn parse(s: &str) -> Result<Self, PoolError> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| PoolError::MalformedProxy(s.to_string()))?;
        let protocol: Protocol = scheme.parse()?;

        // Url::port() hides scheme-default ports, so require the explicit
        // `:port` suffix on the raw string instead.
        let port = rest
            .rsplit_once(':')
            .map(|(_, port)| port)
            .ok_or_else(|| PoolError::MalformedProxy(s.to_string()))?;
        if port.parse::<u16>().is_err() {
            return Err(PoolError::MalformedProxy(s.to_string()));
        }

        // Url still validates the host; the scheme check above stays
        // case-sensitive because Url would normalize it.
        let url = Url::parse(s).map_err(|_| PoolError::MalformedProxy(s.to_string()))?;
        if url.host_str().is_none() {
            return Err(PoolError::MalformedProxy(s.to_string()));
        }

        Ok(Self {
            raw: s.to_string(),
            protocol,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ProxyId {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_supported_protocols() {
        for scheme in ["http", "https", "socks4", "socks5"] {
            let raw = format!("{scheme}://127.0.0.1:1080");
            let id = ProxyId::parse(&raw).unwrap();
            assert_eq!(id.as_str(), raw);
            assert_eq!(id.protocol().as_str(), scheme);
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(ProxyId::parse("ftp://127.0.0.1:21").is_err());
    }

    #[test]
    fn rejects_uppercase_scheme() {
        assert!(ProxyId::parse("HTTP://127.0.0.1:8080").is_err());
    }

    #[test]
    fn rejects_missing_port() {
        assert!(ProxyId::parse("http://127.0.0.1").is_err());
    }

    #[test]
    fn rejects_bare_host_port() {
        assert!(ProxyId::parse("127.0.0.1:8080").is_err());
    }

    #[test]
    fn display_round_trips() {
        let id = ProxyId::parse("socks5://10.0.0.1:1080").unwrap();
        assert_eq!(id.to_string(), "socks5://10.0.0.1:1080");
    }
}
