//! Server binary error types.

use relay_core::RelayError;

/// Errors that can occur while running the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, missing TLS certs, etc.).
    ///
    /// Fatal; fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, TLS handshake failure, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// A connection's state machine reported a fatal error. Fatal for that
    /// connection only; the server keeps serving others.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
