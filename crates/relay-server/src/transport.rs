//! TCP/TLS transport.
//!
//! Production transport using plain TCP, optionally wrapped in TLS via
//! `tokio-rustls`. Supports both production TLS certificates (via PEM
//! files) and self-signed certificates for testing, mirroring the
//! teacher's QUIC transport's certificate-loading shape.

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

use crate::error::ServerError;

/// Either a plain TCP stream or a TLS-wrapped one, behind a uniform async
/// I/O surface so callers don't need to distinguish them.
pub trait DownstreamStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}
impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> DownstreamStream for T {}

/// A boxed, type-erased downstream stream.
pub type BoxedStream = Box<dyn DownstreamStream>;

/// TCP transport, optionally TLS-terminating.
pub struct TcpTransport {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl TcpTransport {
    /// Bind a listener at `address`. If `cert_path`/`key_path` are both
    /// given, TLS-terminate every accepted connection; otherwise accept
    /// plaintext.
    pub async fn bind(
        address: &str,
        cert_path: Option<String>,
        key_path: Option<String>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        let acceptor = match (cert_path, key_path) {
            (Some(cert), Some(key)) => Some(TlsAcceptor::from(Arc::new(load_tls_config(&cert, &key)?))),
            (None, None) => None,
            _ => {
                return Err(ServerError::Config(
                    "both --cert and --key must be given to enable TLS".into(),
                ));
            },
        };

        tracing::info!(%addr, tls = acceptor.is_some(), "transport bound");
        Ok(Self { listener, acceptor })
    }

    /// Accept one connection, TLS-handshaking it first if configured.
    pub async fn accept(&self) -> Result<(BoxedStream, SocketAddr), ServerError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        match &self.acceptor {
            Some(acceptor) => {
                let tls_stream = acceptor
                    .accept(stream)
                    .await
                    .map_err(|e| ServerError::Transport(format!("TLS handshake failed: {e}")))?;
                Ok((Box::new(tls_stream), peer))
            },
            None => Ok((Box::new(stream), peer)),
        }
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Dial the origin, with TLS when the caller asks for it (the HTTP/1.1 and
/// HTTP/2 CONNECT methods run over TLS between the client and server
/// handlers; the origin dial itself is always plaintext TCP).
pub async fn connect_origin(host_port: &str) -> Result<TcpStream, ServerError> {
    TcpStream::connect(host_port)
        .await
        .map_err(|e| ServerError::Transport(format!("origin connect to {host_port} failed: {e}")))
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &str, key_path: &str) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| ServerError::Config(format!("failed to read cert '{cert_path}': {e}")))?;
    let key_pem = fs::read(key_path)
        .map_err(|e| ServerError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;
    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))
}

/// Adapts one accepted HTTP/2 CONNECT stream's `SendStream`/`RecvStream`
/// halves to [`DownstreamStream`], the same way the client side adapts its
/// `send_request` halves: the pipe scheduler that runs on top neither knows
/// nor cares that its upstream tunnel is h2-framed.
pub struct H2Stream {
    send: h2::SendStream<Bytes>,
    recv: h2::RecvStream,
    read_buf: Bytes,
}

impl H2Stream {
    /// Wrap the accepted stream's request/response halves.
    pub fn new(send: h2::SendStream<Bytes>, recv: h2::RecvStream) -> Self {
        Self { send, recv, read_buf: Bytes::new() }
    }
}

fn h2_to_io(err: h2::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl AsyncRead for H2Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.read_buf.is_empty() {
            let take = this.read_buf.len().min(buf.remaining());
            buf.put_slice(&this.read_buf[..take]);
            this.read_buf = this.read_buf.split_off(take);
            return Poll::Ready(Ok(()));
        }
        match this.recv.poll_data(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(h2_to_io(e))),
            Poll::Ready(Some(Ok(chunk))) => {
                let _ = this.recv.flow_control().release_capacity(chunk.len());
                let take = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..take]);
                if take < chunk.len() {
                    this.read_buf = chunk.slice(take..);
                }
                Poll::Ready(Ok(()))
            },
        }
    }
}

impl AsyncWrite for H2Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.send.reserve_capacity(buf.len());
        match this.send.poll_capacity(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "HTTP/2 stream closed"))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(h2_to_io(e))),
            Poll::Ready(Some(Ok(capacity))) => {
                let take = buf.len().min(capacity.max(1));
                this.send.send_data(Bytes::copy_from_slice(&buf[..take]), false).map_err(h2_to_io)?;
                Poll::Ready(Ok(take))
            },
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.send.send_data(Bytes::new(), true).map_err(h2_to_io)?;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_binds_plaintext() {
        let transport = TcpTransport::bind("127.0.0.1:0", None, None).await.unwrap();
        assert_ne!(transport.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn transport_rejects_invalid_address() {
        let result = TcpTransport::bind("not-an-address", None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn transport_rejects_cert_without_key() {
        let result = TcpTransport::bind("127.0.0.1:0", Some("cert.pem".into()), None).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
