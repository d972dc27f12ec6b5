//! SOCKS5 method-select, connect request/reply, and username/password
//! sub-negotiation (RFC 1928 / RFC 1929).

use crate::{
    destination::Destination,
    errors::{ProtocolError, Result},
};

const VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;

/// Authentication method identifiers (RFC 1928 §3).
pub mod method {
    /// No authentication required.
    pub const NO_AUTH: u8 = 0x00;
    /// Username/password (RFC 1929).
    pub const USER_PASS: u8 = 0x02;
    /// No acceptable methods.
    pub const NO_ACCEPTABLE: u8 = 0xff;
}

/// A client's method-select message: `05 nmethods methods...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelectRequest {
    /// Authentication methods offered by the client, in order.
    pub methods: Vec<u8>,
}

impl MethodSelectRequest {
    /// Parse a method-select request from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.first() != Some(&VERSION) {
            return Err(ProtocolError::NotThisProtocol);
        }
        let Some(&nmethods) = buf.get(1) else {
            return Err(ProtocolError::Incomplete { needed: 1 });
        };
        let total = 2 + nmethods as usize;
        if buf.len() < total {
            return Err(ProtocolError::Incomplete { needed: total - buf.len() });
        }
        Ok((Self { methods: buf[2..total].to_vec() }, total))
    }

    /// Does the client offer no-auth?
    pub fn offers_no_auth(&self) -> bool {
        self.methods.contains(&method::NO_AUTH)
    }

    /// Does the client offer username/password?
    pub fn offers_user_pass(&self) -> bool {
        self.methods.contains(&method::USER_PASS)
    }
}

/// Server's method-select reply: `05 method`.
pub fn encode_method_reply(chosen: u8) -> [u8; 2] {
    [VERSION, chosen]
}

/// Username/password sub-negotiation request: `01 ulen u... plen p...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPassRequest {
    /// Username bytes.
    pub username: Vec<u8>,
    /// Password bytes.
    pub password: Vec<u8>,
}

impl UserPassRequest {
    /// Parse a username/password sub-negotiation request.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.first() != Some(&0x01) {
            return Err(ProtocolError::Malformed { what: "SOCKS5 user/pass sub-negotiation version" });
        }
        let Some(&ulen) = buf.get(1) else {
            return Err(ProtocolError::Incomplete { needed: 1 });
        };
        let ulen = ulen as usize;
        if buf.len() < 2 + ulen + 1 {
            return Err(ProtocolError::Incomplete { needed: 2 + ulen + 1 - buf.len() });
        }
        let username = buf[2..2 + ulen].to_vec();
        let plen = buf[2 + ulen] as usize;
        let total = 2 + ulen + 1 + plen;
        if buf.len() < total {
            return Err(ProtocolError::Incomplete { needed: total - buf.len() });
        }
        let password = buf[2 + ulen + 1..total].to_vec();
        Ok((Self { username, password }, total))
    }

    /// Encode this request.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.username.len() + self.password.len());
        out.push(0x01);
        out.push(self.username.len() as u8);
        out.extend_from_slice(&self.username);
        out.push(self.password.len() as u8);
        out.extend_from_slice(&self.password);
        out
    }
}

/// Username/password sub-negotiation reply: `01 status` (0 = success).
pub fn encode_user_pass_reply(success: bool) -> [u8; 2] {
    [0x01, if success { 0x00 } else { 0x01 }]
}

/// SOCKS5 reply status codes (RFC 1928 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Status {
    /// Succeeded.
    Succeeded = 0x00,
    /// General SOCKS server failure.
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset.
    NotAllowed = 0x02,
    /// Network unreachable.
    NetworkUnreachable = 0x03,
    /// Host unreachable.
    HostUnreachable = 0x04,
    /// Connection refused.
    ConnectionRefused = 0x05,
    /// Command not supported.
    CommandNotSupported = 0x07,
    /// Address type not supported.
    AddressTypeNotSupported = 0x08,
}

/// A SOCKS5 connect request: `05 01 00 atyp addr port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Requested destination.
    pub destination: Destination,
}

impl ConnectRequest {
    /// Parse a SOCKS5 connect request from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 4 {
            return Err(ProtocolError::Incomplete { needed: 4 - buf.len() });
        }
        if buf[0] != VERSION {
            return Err(ProtocolError::UnsupportedVersion(buf[0]));
        }
        if buf[1] != CMD_CONNECT {
            return Err(ProtocolError::UnsupportedCommand(buf[1]));
        }
        // buf[2] is RSV, must be 0x00; tolerated either way.
        let (destination, dest_len) = Destination::parse(&buf[3..])?;
        Ok((Self { destination }, 3 + dest_len))
    }

    /// Encode this request.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![VERSION, CMD_CONNECT, 0x00];
        self.destination.encode(&mut out);
        out
    }
}

/// A SOCKS5 connect reply: `05 status 00 atyp addr port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReply {
    /// Reply status.
    pub status: Socks5Status,
    /// Bound address reported to the client (meaningless for CONNECT-only
    /// proxies; conventionally the unspecified address).
    pub bound: Destination,
}

impl ConnectReply {
    /// Build a success reply with an unspecified bound address.
    pub fn succeeded() -> Self {
        Self {
            status: Socks5Status::Succeeded,
            bound: Destination::Ipv4(std::net::Ipv4Addr::UNSPECIFIED, 0),
        }
    }

    /// Build a failure reply.
    pub fn failed(status: Socks5Status) -> Self {
        Self { status, bound: Destination::Ipv4(std::net::Ipv4Addr::UNSPECIFIED, 0) }
    }

    /// Encode this reply.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![VERSION, self.status as u8, 0x00];
        self.bound.encode(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_select_roundtrip() {
        let req = MethodSelectRequest { methods: vec![0x00, 0x02] };
        let mut buf = vec![VERSION, req.methods.len() as u8];
        buf.extend_from_slice(&req.methods);
        let (parsed, consumed) = MethodSelectRequest::parse(&buf).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(consumed, buf.len());
        assert!(parsed.offers_no_auth());
        assert!(parsed.offers_user_pass());
    }

    #[test]
    fn connect_request_roundtrip() {
        let req = ConnectRequest { destination: Destination::domain("example.com", 443).unwrap() };
        let encoded = req.encode();
        let (parsed, consumed) = ConnectRequest::parse(&encoded).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn connect_reply_roundtrip() {
        let reply = ConnectReply::succeeded();
        let encoded = reply.encode();
        assert_eq!(encoded[0], VERSION);
        assert_eq!(encoded[1], Socks5Status::Succeeded as u8);
    }

    #[test]
    fn user_pass_roundtrip() {
        let req = UserPassRequest { username: b"alice".to_vec(), password: b"hunter2".to_vec() };
        let encoded = req.encode();
        let (parsed, consumed) = UserPassRequest::parse(&encoded).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn no_acceptable_method_reply() {
        assert_eq!(encode_method_reply(method::NO_ACCEPTABLE), [VERSION, 0xff]);
    }
}
