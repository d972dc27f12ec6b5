//! Client binary error types.

use relay_core::RelayError;

/// Errors that can occur while running the client binary.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration error (invalid bind address, missing credentials, etc.).
    ///
    /// Fatal; fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error reaching the relay server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The relay server rejected or failed the upstream handshake.
    #[error("upstream handshake failed: {0}")]
    UpstreamRejected(String),

    /// A connection's state machine reported a fatal error. Fatal for that
    /// connection only; the client keeps serving others.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
