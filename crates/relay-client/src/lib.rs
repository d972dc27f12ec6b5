//! Local-side forward proxy.
//!
//! Accepts connections from local applications (browsers, CLI tools) that
//! speak SOCKS4/4a, SOCKS5, HTTP CONNECT, or plain HTTP, figures out the
//! requested destination via [`relay_core::client::ClientConnection`]'s
//! sans-I/O demux, then tunnels that destination's traffic to a remote
//! relay server over one of four pluggable upstream transports (see
//! [`transport::dial`]) before pumping bytes with
//! [`relay_core::pipe::run_bidirectional`]: an action-based state machine
//! driven by a thin async runtime loop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod transport;

use std::sync::Arc;

pub use error::ClientError;
use relay_core::{
    ProxyConfig, SocketAdapter,
    client::{ClientAction, ClientConnection, ClientState},
    pipe::run_bidirectional,
};
use relay_crypto::MasterKey;
use relay_proto::Method;
use tokio::net::{TcpListener, TcpStream};

/// Client configuration for the production runtime.
#[derive(Clone)]
pub struct ClientRuntimeConfig {
    /// Local address to listen on for downstream (application) connections.
    pub bind_address: String,
    /// Address of the remote relay server.
    pub relay_address: String,
    /// Local-side handshake/tunnel configuration (also governs the
    /// upstream transport's `method`).
    pub proxy: ProxyConfig,
    /// Pre-shared key for the shadowsocks-AEAD upstream transport, if
    /// that's the configured method.
    pub master_key: Option<MasterKey>,
    /// Accept any TLS certificate from the relay server instead of
    /// validating against the system trust store. Development only.
    pub insecure_tls: bool,
}

/// Production relay client.
pub struct Client {
    listener: TcpListener,
    relay_address: String,
    proxy: Arc<ProxyConfig>,
    master_key: Option<MasterKey>,
    insecure_tls: bool,
}

impl Client {
    /// Bind the local listener.
    pub async fn bind(config: ClientRuntimeConfig) -> Result<Self, ClientError> {
        if matches!(config.proxy.method, Method::ShadowsocksAead(_)) && config.master_key.is_none() {
            return Err(ClientError::Config("shadowsocks-AEAD method requires a master key".into()));
        }
        let listener = TcpListener::bind(&config.bind_address).await?;
        Ok(Self {
            listener,
            relay_address: config.relay_address,
            proxy: Arc::new(config.proxy),
            master_key: config.master_key,
            insecure_tls: config.insecure_tls,
        })
    }

    /// Local address the client is listening on.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ClientError> {
        self.listener.local_addr().map_err(ClientError::from)
    }

    /// Run the client, accepting connections until the process is killed.
    pub async fn run(self) -> Result<(), ClientError> {
        tracing::info!(addr = %self.listener.local_addr()?, "relay client listening");
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let relay_address = self.relay_address.clone();
                    let proxy = Arc::clone(&self.proxy);
                    let master_key = self.master_key.clone();
                    let insecure_tls = self.insecure_tls;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, relay_address, proxy, master_key, insecure_tls).await {
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
    stream: TcpStream,
    relay_address: String,
    proxy: Arc<ProxyConfig>,
    master_key: Option<MasterKey>,
    insecure_tls: bool,
) -> Result<(), ClientError> {
    let mut downstream = SocketAdapter::new(stream);
    let mut conn = ClientConnection::new(Arc::clone(&proxy));
    let mut pending_forward = Vec::new();

    let mut buf = [0u8; 16 * 1024];
    let destination = loop {
        let n = downstream.read_some(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let actions = conn.handle_client_bytes(&buf[..n])?;
        let mut dialed = None;
        for action in actions {
            match action {
                ClientAction::ReplyToClient(bytes) => {
                    downstream.write_some(&bytes).await?;
                },
                ClientAction::Dial(destination) => dialed = Some(destination),
                ClientAction::ForwardToUpstream(bytes) => pending_forward.extend(bytes),
                ClientAction::Close { reason } => {
                    tracing::debug!(%reason, "client connection closed during handshake");
                    return Ok(());
                },
            }
        }

        if let Some(destination) = dialed {
            break destination;
        }
        if conn.state() == ClientState::Closed {
            return Ok(());
        }
    };

    let credentials = match (&proxy.username, &proxy.password) {
        (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
        _ => None,
    };

    match transport::dial(&relay_address, proxy.method, &destination, credentials, master_key.as_ref(), insecure_tls).await {
        Ok(upstream_stream) => {
            for action in conn.connect_established() {
                if let ClientAction::ReplyToClient(bytes) = action {
                    downstream.write_some(&bytes).await?;
                }
            }
            let mut upstream = SocketAdapter::new(upstream_stream);
            if !pending_forward.is_empty() {
                upstream.write_some(&pending_forward).await?;
            }
            if conn.http_keep_alive_remaining().is_some() {
                return run_http_keepalive_duplex(downstream, upstream, conn).await;
            }
            run_bidirectional(downstream, upstream).await?;
            Ok(())
        },
        Err(e) => {
            for action in conn.connect_failed(&e.to_string()) {
                if let ClientAction::ReplyToClient(bytes) = action {
                    downstream.write_some(&bytes).await?;
                }
            }
            Ok(())
        },
    }
}

/// Steady-state pump for a plain-HTTP tunnel with keep-alive pipelining:
/// unlike every other method, the downstream application may send a
/// second (third, ...) request after the first response, reusing this
/// same upstream connection. Body bytes are forwarded untouched; once
/// [`ClientConnection::http_keep_alive_remaining`] reaches zero, the next
/// downstream read is re-parsed as a fresh request line and rewritten the
/// same way the first one was.
async fn run_http_keepalive_duplex(
    downstream: SocketAdapter<TcpStream>,
    upstream: SocketAdapter<transport::BoxedUpstream>,
    mut conn: ClientConnection,
) -> Result<(), ClientError> {
    let (mut down_r, mut down_w) = downstream.split();
    let (mut up_r, mut up_w) = upstream.split();

    let downstream_to_upstream = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = down_r.read_some(&mut buf).await?;
            if n == 0 {
                up_w.shutdown().await?;
                return Ok::<(), ClientError>(());
            }

            let awaiting_pipelined_request = conn.http_keep_alive_remaining().is_some_and(|remaining| remaining <= 0);
            let to_write = if awaiting_pipelined_request {
                conn.handle_http_pipelined_bytes(&buf[..n])?
                    .into_iter()
                    .find_map(|action| match action {
                        ClientAction::ForwardToUpstream(bytes) => Some(bytes),
                        _ => None,
                    })
                    .unwrap_or_default()
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

    let upstream_to_downstream = async {
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = up_r.read_some(&mut buf).await?;
            if n == 0 {
                down_w.shutdown().await?;
                return Ok::<(), ClientError>(());
            }
            let mut offset = 0;
            while offset < n {
                offset += down_w.write_some(&buf[offset..n]).await?;
            }
        }
    };

    tokio::try_join!(downstream_to_upstream, upstream_to_downstream)?;
    Ok(())
}
