//! Loopback fixtures for end-to-end tests: a fake origin, a self-signed
//! TLS keypair on disk, and small raw-socket helpers for driving the
//! client's downstream side the way a real application would (speaking
//! SOCKS4/4a/5, HTTP CONNECT, or plain HTTP over a bare `TcpStream`).
//!
//! Each `tests/*.rs` file wires up a [`relay_server::Server`] and a
//! [`relay_client::Client`] against each other over real loopback TCP,
//! the same way the production binaries run, then drives a plain
//! `TcpStream` against the client exactly as a browser or CLI tool
//! would. No network simulation: the whole point of these tests is that
//! client and server are real async tasks talking real bytes.

use std::{io, net::SocketAddr, path::PathBuf};

use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Spawn a TCP origin that echoes back whatever it reads, until the peer
/// closes its write half.
pub async fn spawn_echo_origin() -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, peer)) = listener.accept().await else { return };
            tracing::debug!(%peer, "echo origin accepted connection");
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        },
                    }
                }
            });
        }
    });
    Ok(addr)
}

/// Spawn a TCP origin that, for each connection, reads until it sees
/// `\r\n\r\n` and writes back `response` verbatim. Returns the accepted
/// request's head alongside the address so a test can assert the relay
/// rewrote it (e.g. absolute-URI to abs-path) before forwarding.
pub async fn spawn_canned_http_origin(response: &'static [u8]) -> io::Result<(SocketAddr, tokio::sync::oneshot::Receiver<Vec<u8>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else { return };
        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while !request.ends_with(b"\r\n\r\n") {
            match stream.read_exact(&mut byte).await {
                Ok(_) => request.push(byte[0]),
                Err(_) => break,
            }
        }
        let _ = tx.send(request);
        let _ = stream.write_all(response).await;
    });
    Ok((addr, rx))
}

/// Spawn a TCP origin that, for a single connection, reads two
/// back-to-back requests (each terminated by `\r\n\r\n`, no body) and
/// replies to each with the matching entry of `responses`, without
/// closing the connection in between. Returns both accepted requests'
/// heads so a test can assert each was rewritten independently.
pub async fn spawn_pipelined_http_origin(
    responses: [&'static [u8]; 2],
) -> io::Result<(SocketAddr, tokio::sync::oneshot::Receiver<[Vec<u8>; 2]>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else { return };
        let mut requests = [Vec::new(), Vec::new()];
        for (i, response) in responses.into_iter().enumerate() {
            let mut byte = [0u8; 1];
            while !requests[i].ends_with(b"\r\n\r\n") {
                match stream.read_exact(&mut byte).await {
                    Ok(_) => requests[i].push(byte[0]),
                    Err(_) => return,
                }
            }
            if stream.write_all(response).await.is_err() {
                return;
            }
        }
        let _ = tx.send(requests);
    });
    Ok((addr, rx))
}

/// A self-signed certificate and key, PEM-encoded on disk for the
/// duration of the returned `TempDir`'s lifetime (the caller must keep
/// it alive as long as the server needs to read the files).
pub struct TestCert {
    /// Directory backing `cert_path`/`key_path`; dropped removes both files.
    pub dir: TempDir,
    /// Path to the PEM-encoded certificate.
    pub cert_path: PathBuf,
    /// Path to the PEM-encoded private key.
    pub key_path: PathBuf,
}

/// Generate a `localhost` self-signed certificate and write it to a
/// fresh temp directory.
#[allow(clippy::expect_used)]
pub fn generate_test_cert() -> TestCert {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).expect("self-signed cert generation");
    let dir = TempDir::new().expect("tempdir");
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    std::fs::write(&cert_path, cert.cert.pem()).expect("write cert");
    std::fs::write(&key_path, cert.key_pair.serialize_pem()).expect("write key");
    TestCert { dir, cert_path, key_path }
}

/// Read a SOCKS5 method-select reply (`05 method`) and return the chosen
/// method byte.
pub async fn read_socks5_method_reply(stream: &mut TcpStream) -> io::Result<u8> {
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    Ok(reply[1])
}

/// Read a full SOCKS5 CONNECT reply (`05 status 00 atyp addr port`) and
/// return the status byte.
pub async fn read_socks5_connect_reply(stream: &mut TcpStream) -> io::Result<u8> {
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    let trailing_len = match head[3] {
        1 => 4 + 2,
        4 => 16 + 2,
        3 => {
            let mut len_byte = [0u8; 1];
            stream.read_exact(&mut len_byte).await?;
            len_byte[0] as usize + 2
        },
        _ => 0,
    };
    let mut trailing = vec![0u8; trailing_len];
    stream.read_exact(&mut trailing).await?;
    Ok(head[1])
}

/// Encode a SOCKS5 CONNECT request for `host:port`, domain form.
pub fn socks5_connect_request_domain(host: &str, port: u16) -> Vec<u8> {
    let mut out = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    out.extend_from_slice(host.as_bytes());
    out.extend_from_slice(&port.to_be_bytes());
    out
}

/// Read HTTP response/headers up to and including the terminating
/// `\r\n\r\n`.
pub async fn read_http_head(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }
    Ok(head)
}
