//! Error types for wire-format parsing.

use thiserror::Error;

/// Errors produced while parsing or encoding a wire-format message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes were available to complete the message. Callers
    /// should buffer more input and retry; this is not a fatal error.
    #[error("incomplete message, need {needed} more byte(s)")]
    Incomplete {
        /// Additional bytes required before parsing can proceed.
        needed: usize,
    },

    /// The input does not look like this parser's protocol at all. Used by
    /// the client-side auto-detector to try the next candidate parser.
    #[error("input does not match this protocol")]
    NotThisProtocol,

    /// The input matched the protocol's framing but was malformed.
    #[error("malformed {what}")]
    Malformed {
        /// What was being parsed (e.g. "SOCKS5 method-select request").
        what: &'static str,
    },

    /// A domain name exceeded the 255-byte wire limit of the one-byte length
    /// prefix.
    #[error("domain name too long: {len} bytes (max 255)")]
    DestinationTooLong {
        /// Length of the offending domain name.
        len: usize,
    },

    /// An address type byte did not match any known variant.
    #[error("unknown address type {0:#04x}")]
    UnknownAddressType(u8),

    /// An unsupported SOCKS version byte was seen.
    #[error("unsupported SOCKS version {0:#04x}")]
    UnsupportedVersion(u8),

    /// The request named a SOCKS command this proxy does not implement
    /// (e.g. BIND, UDP ASSOCIATE).
    #[error("unsupported command {0:#04x}")]
    UnsupportedCommand(u8),

    /// No acceptable authentication method was offered.
    #[error("no acceptable authentication method offered")]
    NoAcceptableAuthMethod,

    /// Username/password sub-negotiation credentials did not match
    /// configuration.
    #[error("authentication failed")]
    AuthenticationFailed,
}

/// Result alias used throughout `relay-proto`.
pub type Result<T> = std::result::Result<T, ProtocolError>;
