//! A downstream app speaks HTTP CONNECT to the client; the client
//! tunnels to the relay server over a single TLS-wrapped HTTP/2 CONNECT
//! stream, authenticated with `proxy-authorization`, against a
//! self-signed certificate generated for the test.

use relay_client::{Client, ClientRuntimeConfig};
use relay_core::ProxyConfig;
use relay_harness::{generate_test_cert, spawn_echo_origin};
use relay_proto::Method;
use relay_server::{Server, ServerRuntimeConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

#[tokio::test]
async fn app_to_origin_round_trip_over_http2_connect_tls() {
    let origin_addr = spawn_echo_origin().await.unwrap();
    let cert = generate_test_cert();

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: Some(cert.cert_path.to_string_lossy().into_owned()),
        key_path: Some(cert.key_path.to_string_lossy().into_owned()),
        proxy: ProxyConfig {
            method: Method::Http2Connect,
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        },
        master_key: None,
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: ProxyConfig {
            method: Method::Http2Connect,
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        },
        master_key: None,
        insecure_tls: true,
    })
    .await
    .unwrap();
    let client_addr = client.local_addr().unwrap();
    tokio::spawn(client.run());

    let mut app = TcpStream::connect(client_addr).await.unwrap();
    let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n", origin_addr.port(), origin_addr.port());
    app.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        app.read_exact(&mut byte).await.unwrap();
        response.push(byte[0]);
    }
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"), "got {response:?}");

    app.write_all(b"h2 tunnel round trip").await.unwrap();
    let mut echoed = [0u8; 20];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"h2 tunnel round trip");

    drop(cert.dir);
}

#[tokio::test]
async fn wrong_proxy_credentials_are_rejected_over_http2() {
    let origin_addr = spawn_echo_origin().await.unwrap();
    let cert = generate_test_cert();

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: Some(cert.cert_path.to_string_lossy().into_owned()),
        key_path: Some(cert.key_path.to_string_lossy().into_owned()),
        proxy: ProxyConfig {
            method: Method::Http2Connect,
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        },
        master_key: None,
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: ProxyConfig {
            method: Method::Http2Connect,
            username: Some("alice".into()),
            password: Some("wrong-password".into()),
            ..Default::default()
        },
        master_key: None,
        insecure_tls: true,
    })
    .await
    .unwrap();
    let client_addr = client.local_addr().unwrap();
    tokio::spawn(client.run());

    let mut app = TcpStream::connect(client_addr).await.unwrap();
    let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n", origin_addr.port(), origin_addr.port());
    app.write_all(request.as_bytes()).await.unwrap();

    // The client's own downstream reply is still a SOCKS/HTTP failure
    // rendered from `UpstreamRejected`, not a raw connection drop: the
    // relay server refused the HTTP/2 CONNECT with a non-200 status.
    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    while app.read_exact(&mut byte).await.is_ok() {
        response.push(byte[0]);
        if response.ends_with(b"\r\n\r\n") || response.len() > 256 {
            break;
        }
    }
    assert!(!String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"), "got {response:?}");

    drop(cert.dir);
}
