//! Sans-I/O proxy state machines: buffering, AEAD/padding codecs, the
//! socket/pipe plumbing, and the client-side and server-side connection
//! handlers.
//!
//! The handlers in [`client`] and [`server`] never touch a socket
//! directly — they consume bytes and produce [`client::ClientAction`] /
//! [`server::ServerAction`] values for a driver (in `relay-client` /
//! `relay-server`) to execute. This keeps the protocol logic testable
//! without a runtime and lets the same state machine run over a real
//! socket or an in-memory duplex stream interchangeably.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead_codec;
pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod h2_tunnel;
pub mod padding;
pub mod pipe;
pub mod queue;
pub mod server;
pub mod socket;

pub use aead_codec::AeadStream;
pub use buffer::Buffer;
pub use client::{ClientAction, ClientConnection, ClientState};
pub use config::ProxyConfig;
pub use error::{RelayError, Result};
pub use queue::BufferQueue;
pub use server::{ServerAction, ServerConnection, ServerState};
pub use socket::SocketAdapter;
