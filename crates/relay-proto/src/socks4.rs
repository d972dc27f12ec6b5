//! SOCKS4 / SOCKS4a request and reply.
//!
//! Wire format:
//!
//! ```text
//! request: 04 01 port_hi port_lo ip(4) userid \0 [domain \0]
//! reply:   00 5A port_hi port_lo ip(4)          (0x5A granted, 0x5B failed)
//! ```
//!
//! A request whose `ip` field is `0.0.0.x` with `x != 0` is SOCKS4a: the
//! domain name follows the NUL-terminated userid instead of a real address.

use std::net::Ipv4Addr;

use crate::{
    destination::Destination,
    errors::{ProtocolError, Result},
};

const VERSION: u8 = 0x04;
const COMMAND_CONNECT: u8 = 0x01;

/// Reply status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Status {
    /// Request granted.
    Granted,
    /// Request rejected or failed.
    Failed,
}

impl Socks4Status {
    fn to_byte(self) -> u8 {
        match self {
            Self::Granted => 0x5a,
            Self::Failed => 0x5b,
        }
    }
}

/// A parsed SOCKS4/4a CONNECT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks4Request {
    /// Destination the client wants to reach. `Destination::Domain` only
    /// appears for SOCKS4a requests.
    pub destination: Destination,
    /// USERID field, not used for authentication by this proxy but
    /// preserved for logging.
    pub user_id: Vec<u8>,
}

impl Socks4Request {
    /// Parse a SOCKS4/4a request from the front of `buf`.
    ///
    /// Returns `ProtocolError::NotThisProtocol` immediately if the first
    /// byte isn't `0x04`, so the client auto-detector can try the next
    /// parser without consuming input.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.first() != Some(&VERSION) {
            return Err(ProtocolError::NotThisProtocol);
        }
        if buf.len() < 8 {
            return Err(ProtocolError::Incomplete { needed: 8 - buf.len() });
        }
        let command = buf[1];
        if command != COMMAND_CONNECT {
            return Err(ProtocolError::UnsupportedCommand(command));
        }
        let port = u16::from_be_bytes([buf[2], buf[3]]);
        let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);

        let Some(user_id_end) = buf[8..].iter().position(|&b| b == 0) else {
            return Err(ProtocolError::Incomplete { needed: 1 });
        };
        let user_id = buf[8..8 + user_id_end].to_vec();
        let mut consumed = 8 + user_id_end + 1;

        // SOCKS4a: 0.0.0.x with x != 0 means "domain name follows".
        let is_socks4a = ip.octets()[0] == 0 && ip.octets()[1] == 0 && ip.octets()[2] == 0 && ip.octets()[3] != 0;

        let destination = if is_socks4a {
            let domain_start = consumed;
            let Some(domain_end) = buf[domain_start..].iter().position(|&b| b == 0) else {
                return Err(ProtocolError::Incomplete { needed: 1 });
            };
            let domain = std::str::from_utf8(&buf[domain_start..domain_start + domain_end])
                .map_err(|_| ProtocolError::Malformed { what: "SOCKS4a domain name (not UTF-8)" })?
                .to_string();
            consumed = domain_start + domain_end + 1;
            Destination::domain(domain, port)?
        } else {
            Destination::Ipv4(ip, port)
        };

        Ok((Self { destination, user_id }, consumed))
    }
}

/// A SOCKS4/4a reply (`00 status port_hi port_lo ip(4)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socks4Reply {
    /// Granted or failed.
    pub status: Socks4Status,
}

impl Socks4Reply {
    /// Build a granted reply. The bound address is not meaningful for a
    /// CONNECT-only proxy and is always reported as `0.0.0.0:0`, matching
    /// the original implementation.
    pub fn granted() -> Self {
        Self { status: Socks4Status::Granted }
    }

    /// Build a failed reply.
    pub fn failed() -> Self {
        Self { status: Socks4Status::Failed }
    }

    /// Encode the 8-byte reply.
    pub fn encode(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[1] = self.status.to_byte();
        out
    }
}
