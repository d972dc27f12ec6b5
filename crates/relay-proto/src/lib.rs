//! Wire-format types shared by the client-side and server-side proxy
//! handlers: SOCKS4/4a/5 messages, the shadowsocks destination header, small
//! HTTP/1.1 helpers, and the transport `Method` selector.
//!
//! This crate has no I/O and no async runtime dependency — it only encodes
//! and decodes byte sequences, so it can be fuzzed and property-tested in
//! isolation from the state machines that drive it.

pub mod destination;
pub mod errors;
pub mod http;
pub mod method;
pub mod socks4;
pub mod socks5;

pub use destination::Destination;
pub use errors::ProtocolError;
pub use method::{CipherKind, Method};
