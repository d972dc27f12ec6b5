//! The upstream transport selector.
//!
//! A single `method` value picks which of the four transports carries
//! traffic from the local handler to the remote relay.
//! For shadowsocks this also picks the AEAD cipher.

use std::str::FromStr;

/// AEAD cipher used by a shadowsocks transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    /// AES-128-GCM.
    Aes128Gcm,
    /// AES-192-GCM.
    Aes192Gcm,
    /// AES-256-GCM.
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    Chacha20Poly1305,
    /// XChaCha20-Poly1305.
    XChacha20Poly1305,
}

impl CipherKind {
    /// Key and salt length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes192Gcm => 24,
            Self::Aes256Gcm | Self::Chacha20Poly1305 | Self::XChacha20Poly1305 => 32,
        }
    }

    /// AEAD authentication tag length in bytes (16 for every kind here).
    pub fn tag_len(self) -> usize {
        16
    }

    /// Nonce length used for the per-record AEAD seal/open, before
    /// little-endian counter padding.
    pub fn nonce_len(self) -> usize {
        match self {
            Self::XChacha20Poly1305 => 24,
            _ => 12,
        }
    }
}

impl FromStr for CipherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-128-gcm" => Ok(Self::Aes128Gcm),
            "aes-192-gcm" => Ok(Self::Aes192Gcm),
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            "chacha20-poly1305" | "chacha20-ietf-poly1305" => Ok(Self::Chacha20Poly1305),
            "xchacha20-poly1305" | "xchacha20-ietf-poly1305" => Ok(Self::XChacha20Poly1305),
            other => Err(format!("unknown cipher {other}")),
        }
    }
}

/// Which transport carries traffic between the client-side and server-side
/// handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Nested SOCKS4 request to an upstream SOCKS4 proxy (numeric
    /// destinations only; domains are resolved locally before dialing).
    Socks4,
    /// Nested SOCKS4a request (domains carried verbatim).
    Socks4a,
    /// Nested SOCKS5 request, numeric destinations only.
    Socks5,
    /// Nested SOCKS5 request, domains carried verbatim ("SOCKS5h").
    Socks5h,
    /// HTTP/1.1 CONNECT tunnel, optionally over TLS.
    Http1Connect,
    /// HTTP/2 CONNECT tunnel over TLS (single stream per connection).
    Http2Connect,
    /// Shadowsocks-style encrypted frame stream.
    ShadowsocksAead(CipherKind),
}

impl Method {
    /// Can this transport carry a domain name verbatim, or must the client
    /// resolve it locally first?
    pub fn preserves_domain(self) -> bool {
        !matches!(self, Self::Socks4 | Self::Socks5)
    }

    /// Does this transport run over TLS?
    pub fn uses_tls(self) -> bool {
        matches!(self, Self::Http1Connect | Self::Http2Connect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_kind_parses_known_names() {
        assert_eq!(CipherKind::from_str("aes-256-gcm"), Ok(CipherKind::Aes256Gcm));
        assert_eq!(CipherKind::from_str("chacha20-ietf-poly1305"), Ok(CipherKind::Chacha20Poly1305));
        assert!(CipherKind::from_str("rot13").is_err());
    }

    #[test]
    fn key_lengths_match_cipher() {
        assert_eq!(CipherKind::Aes128Gcm.key_len(), 16);
        assert_eq!(CipherKind::Aes256Gcm.key_len(), 32);
        assert_eq!(CipherKind::XChacha20Poly1305.nonce_len(), 24);
    }

    #[test]
    fn domain_preservation_by_method() {
        assert!(!Method::Socks4.preserves_domain());
        assert!(Method::Socks4a.preserves_domain());
        assert!(!Method::Socks5.preserves_domain());
        assert!(Method::Socks5h.preserves_domain());
        assert!(Method::Http1Connect.preserves_domain());
        assert!(Method::ShadowsocksAead(CipherKind::Aes256Gcm).preserves_domain());
    }
}
