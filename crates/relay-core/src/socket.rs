//! Socket adapter: a uniform façade over a plain TCP stream or a TLS
//! stream. Both `TcpStream` and `tokio_rustls`'s TLS streams already
//! implement `AsyncRead + AsyncWrite`, so the adapter is generic over the
//! underlying I/O type rather than an enum — the TLS handshake itself
//! happens before construction (outside this module's scope: TLS context
//! construction is an external collaborator's job).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{RelayError, Result};

/// Non-blocking-flavored read/write/shutdown over any async byte stream.
///
/// `read_some`/`write_some` surface `RelayError::WouldBlock` the same way
/// a raw non-blocking socket would, so callers written against this trait
/// don't need to distinguish plain TCP from TLS.
pub struct SocketAdapter<S> {
    inner: S,
    read_shutdown: bool,
    write_shutdown: bool,
}

impl<S> SocketAdapter<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    /// Wrap an already-connected (and, if applicable, already
    /// TLS-handshaken) stream.
    pub fn new(inner: S) -> Self {
        Self { inner, read_shutdown: false, write_shutdown: false }
    }

    /// Read whatever is immediately available into `buf`, returning the
    /// number of bytes read. `Ok(0)` means EOF.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_shutdown {
            return Ok(0);
        }
        match self.inner.read(buf).await {
            Ok(0) => {
                self.read_shutdown = true;
                Ok(0)
            },
            Ok(n) => Ok(n),
            Err(e) => Err(RelayError::from(e)),
        }
    }

    /// Write as much of `buf` as the sink accepts without blocking,
    /// returning the number of bytes written. Partial writes are normal.
    pub async fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        if self.write_shutdown {
            return Err(RelayError::Protocol("write after shutdown".into()));
        }
        self.inner.write(buf).await.map_err(RelayError::from)
    }

    /// Best-effort half-close of the write side: send TLS close_notify or
    /// TCP FIN once. Idempotent.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.write_shutdown {
            return Ok(());
        }
        self.write_shutdown = true;
        self.inner.shutdown().await.map_err(RelayError::from)
    }

    /// Whether the write side has already been shut down.
    #[must_use]
    pub fn is_write_shutdown(&self) -> bool {
        self.write_shutdown
    }

    /// Whether EOF has already been observed on the read side.
    #[must_use]
    pub fn is_read_shutdown(&self) -> bool {
        self.read_shutdown
    }

    /// Unconditional tear-down; drops the inner stream.
    pub fn close(self) {
        drop(self.inner);
    }

    /// Split into independent read/write halves via `tokio::io::split`, so
    /// each side can be driven by a different concurrent task/future
    /// without both needing a mutable borrow of the same value — which is
    /// exactly what [`crate::pipe::run_bidirectional`] needs to pump two
    /// directions concurrently.
    pub fn split(self) -> (ReadSide<tokio::io::ReadHalf<S>>, WriteSide<tokio::io::WriteHalf<S>>) {
        let (read_half, write_half) = tokio::io::split(self.inner);
        (
            ReadSide { inner: read_half, read_shutdown: self.read_shutdown },
            WriteSide { inner: write_half, write_shutdown: self.write_shutdown },
        )
    }
}

/// The read half of a split [`SocketAdapter`] (or a standalone reader).
pub struct ReadSide<S> {
    inner: S,
    read_shutdown: bool,
}

impl<S: tokio::io::AsyncRead + Unpin> ReadSide<S> {
    /// Wrap a reader directly, without going through [`SocketAdapter::split`].
    pub fn new(inner: S) -> Self {
        Self { inner, read_shutdown: false }
    }

    /// Read whatever is immediately available into `buf`. `Ok(0)` means EOF.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.read_shutdown {
            return Ok(0);
        }
        match self.inner.read(buf).await {
            Ok(0) => {
                self.read_shutdown = true;
                Ok(0)
            },
            Ok(n) => Ok(n),
            Err(e) => Err(RelayError::from(e)),
        }
    }
}

/// The write half of a split [`SocketAdapter`] (or a standalone writer).
pub struct WriteSide<S> {
    inner: S,
    write_shutdown: bool,
}

impl<S: tokio::io::AsyncWrite + Unpin> WriteSide<S> {
    /// Wrap a writer directly, without going through [`SocketAdapter::split`].
    pub fn new(inner: S) -> Self {
        Self { inner, write_shutdown: false }
    }

    /// Write as much of `buf` as the sink accepts without blocking.
    pub async fn write_some(&mut self, buf: &[u8]) -> Result<usize> {
        if self.write_shutdown {
            return Err(RelayError::Protocol("write after shutdown".into()));
        }
        self.inner.write(buf).await.map_err(RelayError::from)
    }

    /// Best-effort half-close. Idempotent.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.write_shutdown {
            return Ok(());
        }
        self.write_shutdown = true;
        self.inner.shutdown().await.map_err(RelayError::from)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn read_some_reports_eof_as_zero() {
        let (a, b) = duplex(64);
        drop(a);
        let mut adapter = SocketAdapter::new(b);
        let mut buf = [0u8; 16];
        let n = adapter.read_some(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(adapter.is_read_shutdown());
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let (a, b) = duplex(64);
        let mut writer = SocketAdapter::new(a);
        let mut reader = SocketAdapter::new(b);

        writer.write_some(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read_some(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (a, _b) = duplex(64);
        let mut adapter = SocketAdapter::new(a);
        adapter.shutdown().await.unwrap();
        assert!(adapter.is_write_shutdown());
        adapter.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn split_halves_work_independently() {
        let (a, b) = duplex(64);
        let adapter = SocketAdapter::new(a);
        let (mut read_side, mut write_side) = adapter.split();
        let mut other = SocketAdapter::new(b);

        write_side.write_some(b"pong").await.unwrap();
        let mut buf = [0u8; 16];
        let n = other.read_some(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");

        other.write_some(b"ack").await.unwrap();
        let n = read_side.read_some(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ack");
    }
}
