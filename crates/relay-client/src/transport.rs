//! Upstream transports: dialing the relay server and establishing one of
//! the four tunnel kinds (shadowsocks-AEAD, HTTP/1.1 CONNECT, HTTP/2
//! CONNECT, nested SOCKS), then handing back a single boxed byte stream
//! that carries the destination's traffic from then on.
//!
//! Mirrors the relay server's `transport` module: type-erase the concrete
//! stream behind a trait object so the caller (the per-connection driver
//! in [`crate`]) doesn't need to match on the method a second time once
//! the tunnel is up.

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use relay_core::AeadStream;
use relay_crypto::MasterKey;
use relay_proto::{
    CipherKind, Destination,
    socks4::Socks4Reply,
    socks5::{self, ConnectRequest, Socks5Status},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::{TlsConnector, client::TlsStream, rustls};

use crate::error::ClientError;

/// Marker trait so any stream type this module produces can be stored as
/// one boxed value.
pub trait UpstreamIo: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> UpstreamIo for T {}

/// A fully-established tunnel to the destination, opaque from here on.
pub type BoxedUpstream = Box<dyn UpstreamIo>;

/// Dial `relay_address` and perform whichever upstream handshake `method`
/// calls for, returning a stream that's ready to carry `destination`'s
/// traffic.
pub async fn dial(
    relay_address: &str,
    method: relay_proto::Method,
    destination: &Destination,
    credentials: Option<(&str, &str)>,
    master_key: Option<&MasterKey>,
    insecure_tls: bool,
) -> Result<BoxedUpstream, ClientError> {
    use relay_proto::Method;

    let resolved;
    let destination = if method.preserves_domain() {
        destination
    } else {
        resolved = resolve_locally(destination).await?;
        &resolved
    };

    match method {
        Method::ShadowsocksAead(kind) => dial_shadowsocks(relay_address, kind, destination, master_key).await,
        Method::Socks4 | Method::Socks4a => dial_socks4(relay_address, destination).await,
        Method::Socks5 | Method::Socks5h => dial_socks5(relay_address, destination, credentials).await,
        Method::Http1Connect => dial_http1_connect(relay_address, destination, credentials, insecure_tls).await,
        Method::Http2Connect => dial_http2_connect(relay_address, destination, credentials, insecure_tls).await,
    }
}

/// Resolve a domain destination with the local resolver, for upstream
/// methods that can't carry a domain name verbatim
/// ([`relay_proto::Method::preserves_domain`] is `false`, i.e. plain
/// SOCKS4 and SOCKS5). Non-domain destinations pass through unchanged.
async fn resolve_locally(destination: &Destination) -> Result<Destination, ClientError> {
    let Destination::Domain(name, port) = destination else {
        return Ok(destination.clone());
    };
    let mut addrs = tokio::net::lookup_host((name.as_str(), *port))
        .await
        .map_err(|e| ClientError::Config(format!("local DNS lookup for '{name}' failed: {e}")))?;
    let addr = addrs
        .next()
        .ok_or_else(|| ClientError::Config(format!("local DNS lookup for '{name}' returned no addresses")))?;
    Ok(Destination::from(addr))
}

async fn dial_shadowsocks(
    relay_address: &str,
    kind: CipherKind,
    destination: &Destination,
    master_key: Option<&MasterKey>,
) -> Result<BoxedUpstream, ClientError> {
    let key = master_key
        .cloned()
        .ok_or_else(|| ClientError::Config("shadowsocks-AEAD method requires a master key".into()))?;
    let tcp = TcpStream::connect(relay_address).await?;
    let mut stream = AeadStream::new(tcp, kind, key);
    let mut header = Vec::new();
    destination.encode(&mut header);
    stream.write_all(&header).await?;
    Ok(Box::new(stream))
}

async fn dial_socks4(relay_address: &str, destination: &Destination) -> Result<BoxedUpstream, ClientError> {
    let mut tcp = TcpStream::connect(relay_address).await?;
    let request = encode_socks4_request(destination)?;
    tcp.write_all(&request).await?;

    let mut reply = [0u8; 8];
    tcp.read_exact(&mut reply).await?;
    if reply[1] != Socks4Reply::granted().encode()[1] {
        return Err(ClientError::UpstreamRejected("SOCKS4 request rejected by relay server".into()));
    }
    Ok(Box::new(tcp))
}

/// Hand-encode a SOCKS4/4a CONNECT request: `04 01 port ip userid\0 [domain\0]`.
/// [`relay_proto::socks4::Socks4Request`] only exposes `parse` (it's the
/// server's job to decode one); the client side needs to build the wire
/// bytes, which this mirrors directly from the module's documented format.
fn encode_socks4_request(destination: &Destination) -> Result<Vec<u8>, ClientError> {
    let mut out = vec![0x04, 0x01];
    out.extend_from_slice(&destination.port().to_be_bytes());
    match destination {
        Destination::Ipv4(addr, _) => {
            out.extend_from_slice(&addr.octets());
            out.push(0x00); // empty USERID
        },
        Destination::Domain(name, _) => {
            out.extend_from_slice(&[0, 0, 0, 1]); // SOCKS4a invalid-IP marker
            out.push(0x00); // empty USERID
            out.extend_from_slice(name.as_bytes());
            out.push(0x00);
        },
        Destination::Ipv6(addr, _) => {
            return Err(ClientError::Config(format!(
                "destination {addr} is IPv6; SOCKS4/4a cannot address it, pick a different upstream method"
            )));
        },
    }
    Ok(out)
}

async fn dial_socks5(
    relay_address: &str,
    destination: &Destination,
    credentials: Option<(&str, &str)>,
) -> Result<BoxedUpstream, ClientError> {
    let mut tcp = TcpStream::connect(relay_address).await?;

    let offered = if credentials.is_some() {
        vec![socks5::method::NO_AUTH, socks5::method::USER_PASS]
    } else {
        vec![socks5::method::NO_AUTH]
    };
    let mut select = vec![0x05, offered.len() as u8];
    select.extend_from_slice(&offered);
    tcp.write_all(&select).await?;

    let mut chosen = [0u8; 2];
    tcp.read_exact(&mut chosen).await?;
    match chosen[1] {
        socks5::method::NO_AUTH => {},
        socks5::method::USER_PASS => {
            let (user, pass) = credentials
                .ok_or_else(|| ClientError::Config("relay server requires SOCKS5 user/pass credentials".into()))?;
            let request = socks5::UserPassRequest { username: user.as_bytes().to_vec(), password: pass.as_bytes().to_vec() };
            tcp.write_all(&request.encode()).await?;
            let mut reply = [0u8; 2];
            tcp.read_exact(&mut reply).await?;
            if reply[1] != 0x00 {
                return Err(ClientError::UpstreamRejected("SOCKS5 credentials rejected by relay server".into()));
            }
        },
        _ => return Err(ClientError::UpstreamRejected("relay server offered no acceptable SOCKS5 method".into())),
    }

    let request = ConnectRequest { destination: destination.clone() };
    tcp.write_all(&request.encode()).await?;

    // `05 status 00 atyp addr port`; the bound address is meaningless for a
    // CONNECT-only proxy, so only `status` and `atyp` (to know how many
    // trailing bytes to discard) matter here.
    let mut head = [0u8; 4];
    tcp.read_exact(&mut head).await?;
    if head[0] != 0x05 {
        return Err(ClientError::UpstreamRejected("malformed SOCKS5 reply version".into()));
    }
    let status = head[1];

    let trailing_len = match head[3] {
        1 => 4 + 2,
        4 => 16 + 2,
        3 => {
            let mut len_byte = [0u8; 1];
            tcp.read_exact(&mut len_byte).await?;
            len_byte[0] as usize + 2
        },
        other => return Err(ClientError::Relay(relay_core::RelayError::Protocol(format!("unknown SOCKS5 ATYP {other}")))),
    };
    let mut trailing = vec![0u8; trailing_len];
    tcp.read_exact(&mut trailing).await?;

    if status != Socks5Status::Succeeded as u8 {
        return Err(ClientError::UpstreamRejected(format!("SOCKS5 CONNECT failed with status {status:#04x}")));
    }
    Ok(Box::new(tcp))
}

async fn dial_http1_connect(
    relay_address: &str,
    destination: &Destination,
    credentials: Option<(&str, &str)>,
    insecure_tls: bool,
) -> Result<BoxedUpstream, ClientError> {
    let mut stream = connect_tls(relay_address, insecure_tls).await?;
    let request = relay_proto::http::build_connect_request(&destination.host_port(), credentials);
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await?;
        response.push(byte[0]);
        if response.len() > 16 * 1024 {
            return Err(ClientError::UpstreamRejected("CONNECT response exceeded header size limit".into()));
        }
    }
    let status_line = response.split(|&b| b == b'\n').next().unwrap_or_default();
    if !status_line.windows(3).any(|w| w == b"200") {
        return Err(ClientError::UpstreamRejected(format!(
            "relay server refused CONNECT: {}",
            String::from_utf8_lossy(status_line).trim()
        )));
    }
    Ok(Box::new(stream))
}

async fn dial_http2_connect(
    relay_address: &str,
    destination: &Destination,
    credentials: Option<(&str, &str)>,
    insecure_tls: bool,
) -> Result<BoxedUpstream, ClientError> {
    let tls = connect_tls(relay_address, insecure_tls).await?;

    let mut builder = h2::client::Builder::new();
    relay_core::h2_tunnel::configure_client(&mut builder);
    let (mut send_request, connection) =
        builder.handshake(tls).await.map_err(|e| ClientError::Transport(format!("HTTP/2 handshake failed: {e}")))?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "HTTP/2 connection to relay server ended");
        }
    });

    let request = relay_core::h2_tunnel::build_connect_request(&destination.host_port(), credentials, false)?;
    let (response_fut, send_stream) =
        send_request.send_request(request, false).map_err(|e| ClientError::Transport(format!("HTTP/2 request failed: {e}")))?;
    let response = response_fut.await.map_err(|e| ClientError::Transport(format!("HTTP/2 response failed: {e}")))?;
    if response.status() != 200 {
        return Err(ClientError::UpstreamRejected(format!("relay server refused CONNECT: {}", response.status())));
    }
    let recv_stream = response.into_body();
    Ok(Box::new(H2Stream { send: send_stream, recv: recv_stream, read_buf: Bytes::new() }))
}

async fn connect_tls(relay_address: &str, insecure: bool) -> Result<TlsStream<TcpStream>, ClientError> {
    let tcp = TcpStream::connect(relay_address).await?;
    let config = tls_client_config(insecure)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = server_name_from_address(relay_address)?;
    connector.connect(server_name, tcp).await.map_err(|e| ClientError::Transport(format!("TLS handshake failed: {e}")))
}

fn server_name_from_address(relay_address: &str) -> Result<rustls::pki_types::ServerName<'static>, ClientError> {
    let host = relay_address.rsplit_once(':').map(|(host, _)| host).unwrap_or(relay_address);
    rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| ClientError::Config(format!("'{host}' is not a valid TLS server name")))
}

fn tls_client_config(insecure: bool) -> Result<rustls::ClientConfig, ClientError> {
    let builder = rustls::ClientConfig::builder();
    let config = if insecure {
        builder.dangerous().with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert)).with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            let _ = roots.add(cert);
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(config)
}

/// Accepts any server certificate. Only reachable with `--insecure-tls`,
/// for talking to a relay server running a self-signed development cert.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Adapts an HTTP/2 CONNECT stream's `(SendStream, RecvStream)` pair into
/// a plain `AsyncRead + AsyncWrite`, so the rest of the client never needs
/// to know its upstream tunnel is h2-framed.
struct H2Stream {
    send: h2::SendStream<Bytes>,
    recv: h2::RecvStream,
    read_buf: Bytes,
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
