//! Remote-side tunnel-terminating proxy server.
//!
//! Wraps [`relay_core::server::ServerConnection`]'s sans-I/O handshake
//! logic with a real TCP/TLS listener, an origin dialer, and
//! [`relay_core::pipe`]'s bidirectional pump: an action-based driver
//! layered over a real async runtime.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod transport;

use std::sync::Arc;

use bytes::Bytes;
pub use error::ServerError;
use relay_core::{
    ProxyConfig, SocketAdapter,
    aead_codec::Encoder,
    pipe::run_bidirectional,
    queue::BufferQueue,
    server::{ServerAction, ServerConnection, ServerState},
};
use relay_crypto::MasterKey;
use relay_proto::{CipherKind, Method};
use tokio::net::TcpStream;
use transport::{BoxedStream, H2Stream, TcpTransport};

/// Server configuration for the production runtime.
#[derive(Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g. `0.0.0.0:8443`).
    pub bind_address: String,
    /// Path to a TLS certificate (PEM), required by HTTP/1.1-CONNECT and
    /// HTTP/2-CONNECT downstream transports.
    pub cert_path: Option<String>,
    /// Path to the matching TLS private key (PEM).
    pub key_path: Option<String>,
    /// Per-connection handshake/tunnel configuration.
    pub proxy: ProxyConfig,
    /// Pre-shared key for the shadowsocks-AEAD transport, if that's the
    /// configured method.
    pub master_key: Option<MasterKey>,
}

/// Production relay server.
pub struct Server {
    transport: TcpTransport,
    proxy: Arc<ProxyConfig>,
    master_key: Option<MasterKey>,
}

impl Server {
    /// Bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if matches!(config.proxy.method, Method::ShadowsocksAead(_)) && config.master_key.is_none() {
            return Err(ServerError::Config("shadowsocks-AEAD method requires a master key".into()));
        }
        let transport = TcpTransport::bind(&config.bind_address, config.cert_path, config.key_path).await?;
        Ok(Self { transport, proxy: Arc::new(config.proxy), master_key: config.master_key })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections until the process is killed.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(addr = %self.transport.local_addr()?, "relay server listening");
        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => {
                    let proxy = Arc::clone(&self.proxy);
                    let master_key = self.master_key.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, proxy, master_key).await {
                            tracing::warn!(%peer, error = %e, "connection ended with error");
                        }
                    });
                },
                Err(e) => tracing::error!(error = %e, "accept failed"),
            }
        }
    }
}

async fn handle_connection(
    stream: BoxedStream,
    proxy: Arc<ProxyConfig>,
    master_key: Option<MasterKey>,
) -> Result<(), ServerError> {
    if proxy.method == Method::Http2Connect {
        return handle_http2_connect(stream, proxy).await;
    }

    let mut downstream = SocketAdapter::new(stream);
    let mut conn = ServerConnection::new(Arc::clone(&proxy));
    let mut pending_forward = Vec::new();

    let mut buf = [0u8; 16 * 1024];
    let origin_stream = loop {
        let n = downstream.read_some(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let actions = match proxy.method {
            Method::ShadowsocksAead(kind) => {
                let key = master_key.clone().ok_or_else(|| {
                    ServerError::Config("shadowsocks-AEAD method requires a master key".into())
                })?;
                conn.handle_shadowsocks_bytes(&buf[..n], kind, key)?
            },
            Method::Socks4 | Method::Socks4a | Method::Socks5 | Method::Socks5h => {
                conn.handle_socks_bytes(&buf[..n])?
            },
            Method::Http1Connect => {
                let (actions, forward) = conn.handle_http1_bytes(&buf[..n])?;
                if let Some(bytes) = forward {
                    pending_forward.extend(bytes);
                }
                actions
            },
            Method::Http2Connect => {
                return Err(ServerError::Config(
                    "HTTP/2-CONNECT is demultiplexed by handle_http2_connect, never this byte loop".into(),
                ));
            },
        };

        let mut dialed = None;
        for action in actions {
            match action {
                ServerAction::ReplyToDownstream(bytes) => {
                    downstream.write_some(&bytes).await?;
                },
                ServerAction::Dial(destination) => dialed = Some(destination),
                ServerAction::ForwardToOrigin(bytes) => pending_forward.extend(bytes),
                ServerAction::Close { reason } => {
                    tracing::debug!(%reason, "server connection closed during handshake");
                    return Ok(());
                },
            }
        }

        if let Some(destination) = dialed {
            match transport::connect_origin(&destination.host_port()).await {
                Ok(stream) => {
                    for action in conn.origin_connected() {
                        if let ServerAction::ReplyToDownstream(bytes) = action {
                            downstream.write_some(&bytes).await?;
                        }
                    }
                    break stream;
                },
                Err(e) => {
                    for action in conn.origin_failed(&e.to_string()) {
                        if let ServerAction::ReplyToDownstream(bytes) = action {
                            downstream.write_some(&bytes).await?;
                        }
                    }
                    return Ok(());
                },
            }
        }

        if conn.state() == ServerState::Closed {
            return Ok(());
        }
    };

    let mut upstream = SocketAdapter::new(origin_stream);
    if !pending_forward.is_empty() {
        upstream.write_some(&pending_forward).await?;
    }

    if let Method::ShadowsocksAead(kind) = proxy.method {
        let key = master_key.ok_or_else(|| {
            ServerError::Config("shadowsocks-AEAD method requires a master key".into())
        })?;
        return run_shadowsocks_duplex(downstream, upstream, conn, kind, key).await;
    }

    if conn.http_keep_alive_remaining().is_some() {
        return run_http_keepalive_duplex(downstream, upstream, conn).await;
    }

    run_bidirectional(downstream, upstream).await?;
    Ok(())
}

/// Steady-state pump for a plain-HTTP tunnel with keep-alive pipelining:
/// unlike every other method, the downstream side may carry a second
/// (third, ...) request after the first response, on the same connection
/// to the same origin. Body bytes are forwarded untouched; once
/// [`ServerConnection::http_keep_alive_remaining`] reaches zero, the next
/// downstream read is re-parsed as a fresh request line and rewritten the
/// same way the first one was.
async fn run_http_keepalive_duplex(
    downstream: SocketAdapter<BoxedStream>,
    origin: SocketAdapter<TcpStream>,
    mut conn: ServerConnection,
) -> Result<(), ServerError> {
    let (mut down_r, mut down_w) = downstream.split();
    let (mut up_r, mut up_w) = origin.split();

    let downstream_to_origin = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = down_r.read_some(&mut buf).await?;
            if n == 0 {
                up_w.shutdown().await?;
                return Ok::<(), ServerError>(());
            }

            let awaiting_pipelined_request = conn.http_keep_alive_remaining().is_some_and(|remaining| remaining <= 0);
            let to_write = if awaiting_pipelined_request {
                conn.handle_http1_pipelined_bytes(&buf[..n])?
            } else {
                conn.note_http_bytes_forwarded(n);
                buf[..n].to_vec()
            };

            let mut offset = 0;
            while offset < to_write.len() {
                offset += up_w.write_some(&to_write[offset..]).await?;
            }
        }
    };

    let origin_to_downstream = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = up_r.read_some(&mut buf).await?;
            if n == 0 {
                down_w.shutdown().await?;
                return Ok::<(), ServerError>(());
            }
            let mut offset = 0;
            while offset < n {
                offset += down_w.write_some(&buf[offset..n]).await?;
            }
        }
    };

    tokio::try_join!(downstream_to_origin, origin_to_downstream)?;
    Ok(())
}

/// Steady-state pump for the shadowsocks-AEAD method: unlike every other
/// transport, the tunnel stays AEAD-framed for the connection's whole
/// lifetime, so plain byte passthrough (`run_bidirectional`) won't do.
/// Downstream ciphertext keeps flowing through the same
/// [`ServerConnection`] decoder that parsed the destination header;
/// origin plaintext is sealed with a fresh [`Encoder`] (shadowsocks uses
/// an independent salt/session per direction).
async fn run_shadowsocks_duplex(
    downstream: SocketAdapter<BoxedStream>,
    origin: SocketAdapter<TcpStream>,
    mut conn: ServerConnection,
    kind: CipherKind,
    master_key: MasterKey,
) -> Result<(), ServerError> {
    let (mut down_r, mut down_w) = downstream.split();
    let (mut up_r, mut up_w) = origin.split();
    let mut encoder = Encoder::new(kind, master_key.clone());

    let downstream_to_origin = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = down_r.read_some(&mut buf).await?;
            if n == 0 {
                up_w.shutdown().await?;
                return Ok::<(), ServerError>(());
            }
            for action in conn.handle_shadowsocks_bytes(&buf[..n], kind, master_key.clone())? {
                if let ServerAction::ForwardToOrigin(bytes) = action {
                    let mut offset = 0;
                    while offset < bytes.len() {
                        offset += up_w.write_some(&bytes[offset..]).await?;
                    }
                }
            }
        }
    };

    let origin_to_downstream = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = up_r.read_some(&mut buf).await?;
            if n == 0 {
                down_w.shutdown().await?;
                return Ok::<(), ServerError>(());
            }
            let mut wire = BufferQueue::new();
            encoder.encode(&buf[..n], &mut wire)?;
            let ciphertext = wire.drain_bytes(wire.byte_sum());
            let mut offset = 0;
            while offset < ciphertext.len() {
                offset += down_w.write_some(&ciphertext[offset..]).await?;
            }
        }
    };

    tokio::try_join!(downstream_to_origin, origin_to_downstream)?;
    Ok(())
}

/// HTTP/2-CONNECT downstream demux. At most one stream is
/// ever served per connection: the initial SETTINGS frame advertises
/// `max_concurrent_streams=1`, and a second stream request is refused with
/// `RST_STREAM`. Driving `connection.accept()` in the background while the
/// accepted stream is served is required even though no further streams are
/// expected — `h2` only advances its internal frame I/O (including writes
/// queued by the accepted stream's `SendStream`) while the `Connection` is
/// polled.
async fn handle_http2_connect(stream: BoxedStream, proxy: Arc<ProxyConfig>) -> Result<(), ServerError> {
    let mut builder = h2::server::Builder::new();
    relay_core::h2_tunnel::configure_server(&mut builder);
    let mut connection = builder
        .handshake(stream)
        .await
        .map_err(|e| ServerError::Transport(format!("HTTP/2 handshake failed: {e}")))?;

    let Some(first) = connection.accept().await else {
        return Ok(());
    };
    let (request, respond) =
        first.map_err(|e| ServerError::Transport(format!("HTTP/2 stream accept failed: {e}")))?;

    let refuse_extra_streams = async {
        while let Some(result) = connection.accept().await {
            if let Ok((_, mut respond)) = result {
                let _ = respond.send_reset(h2::Reason::REFUSED_STREAM);
            }
        }
    };

    let result = tokio::select! {
        result = serve_http2_connect_stream(request, respond, &proxy) => result,
        () = refuse_extra_streams => Ok(()),
    };

    // Once the single stream is torn down, send GOAWAY(NO_ERROR) and flush
    // it before the connection drops.
    connection.graceful_shutdown();
    while connection.accept().await.is_some() {}
    result
}

/// Validate and serve the single accepted CONNECT stream: check method,
/// authority/host agreement, and `Proxy-Authorization`, then dial the
/// origin and pump bytes until either side half-closes.
async fn serve_http2_connect_stream(
    request: http::Request<h2::RecvStream>,
    mut respond: h2::server::SendResponse<Bytes>,
    proxy: &ProxyConfig,
) -> Result<(), ServerError> {
    if request.method() != http::Method::CONNECT {
        let _ = respond.send_reset(h2::Reason::REFUSED_STREAM);
        return Ok(());
    }

    let authority = match request.uri().authority() {
        Some(authority) => authority.to_string(),
        None => {
            let _ = respond.send_reset(h2::Reason::PROTOCOL_ERROR);
            return Ok(());
        },
    };
    let host_header = request.headers().get("host").and_then(|v| v.to_str().ok());
    if !relay_core::h2_tunnel::authority_matches_host(&authority, host_header) {
        let _ = respond.send_reset(h2::Reason::PROTOCOL_ERROR);
        return Ok(());
    }

    if proxy.requires_auth() {
        let (user, pass) =
            (proxy.username.as_deref().unwrap_or_default(), proxy.password.as_deref().unwrap_or_default());
        let authorized = request
            .headers()
            .get("proxy-authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|value| value.strip_prefix("basic ").or_else(|| value.strip_prefix("Basic ")))
            .is_some_and(|value| relay_proto::http::verify_basic_auth(value, user, pass));
        if !authorized {
            if let Ok(response) = http::Response::builder().status(407).body(()) {
                let _ = respond.send_response(response, true);
            }
            return Ok(());
        }
    }

    let padding_requested = relay_core::h2_tunnel::request_advertises_padding(request.headers());

    let origin = match transport::connect_origin(&authority).await {
        Ok(origin) => origin,
        Err(e) => {
            tracing::warn!(%authority, error = %e, "HTTP/2 CONNECT origin dial failed");
            if let Ok(response) = http::Response::builder().status(502).body(()) {
                let _ = respond.send_response(response, true);
            }
            return Ok(());
        },
    };

    let response = relay_core::h2_tunnel::build_connect_response(padding_requested)?;
    let send_stream =
        respond.send_response(response, false).map_err(|e| ServerError::Transport(format!("HTTP/2 response failed: {e}")))?;
    let recv_stream = request.into_body();

    let downstream = SocketAdapter::new(Box::new(H2Stream::new(send_stream, recv_stream)) as BoxedStream);
    let upstream = SocketAdapter::new(origin);
    run_bidirectional(downstream, upstream).await?;
    Ok(())
}
