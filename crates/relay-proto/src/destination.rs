//! The destination header: `atyp || addr || port`.
//!
//! Used both as the shadowsocks inner request (after the AEAD salt) and as
//! the address representation carried internally once any client protocol
//! has been parsed into "where to dial".

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use crate::errors::{ProtocolError, Result};

/// Maximum length of a domain name under the one-byte length prefix.
pub const MAX_DOMAIN_LEN: usize = 255;

const ATYP_IPV4: u8 = 1;
const ATYP_DOMAIN: u8 = 3;
const ATYP_IPV6: u8 = 4;

/// A parsed "connect to" target: an IPv4 address, an IPv6 address, or a
/// domain name, each paired with a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// IPv4 address and port.
    Ipv4(Ipv4Addr, u16),
    /// IPv6 address and port.
    Ipv6(Ipv6Addr, u16),
    /// Domain name (≤ 255 bytes) and port. Preserved verbatim so
    /// domain-preserving transports (shadowsocks, SOCKS5H, HTTP CONNECT) can
    /// let the remote side resolve it.
    Domain(String, u16),
}

impl Destination {
    /// Build a destination from a domain name, validating the wire-format
    /// length limit.
    pub fn domain(name: impl Into<String>, port: u16) -> Result<Self> {
        let name = name.into();
        if name.len() > MAX_DOMAIN_LEN {
            return Err(ProtocolError::DestinationTooLong { len: name.len() });
        }
        Ok(Self::Domain(name, port))
    }

    /// Port this destination refers to.
    pub fn port(&self) -> u16 {
        match self {
            Self::Ipv4(_, p) | Self::Ipv6(_, p) | Self::Domain(_, p) => *p,
        }
    }

    /// Render as a `host:port` string suitable for DNS lookup or an HTTP
    /// `Host`/`:authority` header.
    pub fn host_port(&self) -> String {
        match self {
            Self::Ipv4(addr, port) => format!("{addr}:{port}"),
            Self::Ipv6(addr, port) => format!("[{addr}]:{port}"),
            Self::Domain(name, port) => format!("{name}:{port}"),
        }
    }

    /// Number of bytes this destination occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Ipv4(..) => 1 + 4 + 2,
            Self::Ipv6(..) => 1 + 16 + 2,
            Self::Domain(name, _) => 1 + 1 + name.len() + 2,
        }
    }

    /// Serialize as `atyp(1) || addr || port(u16 be)`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Ipv4(addr, port) => {
                out.push(ATYP_IPV4);
                out.extend_from_slice(&addr.octets());
                out.extend_from_slice(&port.to_be_bytes());
            },
            Self::Ipv6(addr, port) => {
                out.push(ATYP_IPV6);
                out.extend_from_slice(&addr.octets());
                out.extend_from_slice(&port.to_be_bytes());
            },
            Self::Domain(name, port) => {
                out.push(ATYP_DOMAIN);
                // Length validated at construction time.
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(&port.to_be_bytes());
            },
        }
    }

    /// Parse a destination header from the front of `buf`.
    ///
    /// Returns `ProtocolError::Incomplete` if `buf` does not yet hold a full
    /// header; the caller should buffer more bytes and retry.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let atyp = *buf.first().ok_or(ProtocolError::Incomplete { needed: 1 })?;
        match atyp {
            ATYP_IPV4 => {
                if buf.len() < 1 + 4 + 2 {
                    return Err(ProtocolError::Incomplete { needed: 1 + 4 + 2 - buf.len() });
                }
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&buf[1..5]);
                let port = u16::from_be_bytes([buf[5], buf[6]]);
                Ok((Self::Ipv4(Ipv4Addr::from(octets), port), 7))
            },
            ATYP_IPV6 => {
                if buf.len() < 1 + 16 + 2 {
                    return Err(ProtocolError::Incomplete { needed: 1 + 16 + 2 - buf.len() });
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[1..17]);
                let port = u16::from_be_bytes([buf[17], buf[18]]);
                Ok((Self::Ipv6(Ipv6Addr::from(octets), port), 19))
            },
            ATYP_DOMAIN => {
                let len = *buf.get(1).ok_or(ProtocolError::Incomplete { needed: 1 })? as usize;
                let total = 1 + 1 + len + 2;
                if buf.len() < total {
                    return Err(ProtocolError::Incomplete { needed: total - buf.len() });
                }
                let name = std::str::from_utf8(&buf[2..2 + len])
                    .map_err(|_| ProtocolError::Malformed { what: "domain name (not UTF-8)" })?
                    .to_string();
                let port = u16::from_be_bytes([buf[2 + len], buf[3 + len]]);
                Ok((Self::Domain(name, port), total))
            },
            other => Err(ProtocolError::UnknownAddressType(other)),
        }
    }
}

impl From<SocketAddr> for Destination {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(a) => Self::Ipv4(*a.ip(), a.port()),
            SocketAddr::V6(a) => Self::Ipv6(*a.ip(), a.port()),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host_port())
    }
}
