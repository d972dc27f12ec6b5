//! A downstream app speaks HTTP CONNECT to the client; the client
//! tunnels to the relay server over a TLS-wrapped HTTP/1.1 CONNECT
//! request, authenticated with `Proxy-Authorization`, against a
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
async fn app_to_origin_round_trip_over_http1_connect_tls() {
    let origin_addr = spawn_echo_origin().await.unwrap();
    let cert = generate_test_cert();

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: Some(cert.cert_path.to_string_lossy().into_owned()),
        key_path: Some(cert.key_path.to_string_lossy().into_owned()),
        proxy: ProxyConfig {
            method: Method::Http1Connect,
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
            method: Method::Http1Connect,
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

    app.write_all(b"tls tunnel round trip").await.unwrap();
    let mut echoed = [0u8; 22];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"tls tunnel round trip");

    drop(cert.dir);
}
