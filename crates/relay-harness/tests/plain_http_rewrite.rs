//! A downstream app sends a plain (non-CONNECT) HTTP request in
//! absolute-URI form; the client must dial the `Host` via shadowsocks-AEAD
//! and rewrite the request line to abs-path form before forwarding, and
//! the origin's response must flow back unmodified.

use relay_client::{Client, ClientRuntimeConfig};
use relay_core::ProxyConfig;
use relay_crypto::MasterKey;
use relay_harness::{spawn_canned_http_origin, spawn_pipelined_http_origin};
use relay_proto::{CipherKind, Method};
use relay_server::{Server, ServerRuntimeConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const CANNED_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

#[tokio::test]
async fn plain_http_request_line_rewritten_to_abs_path() {
    let (origin_addr, origin_request_rx) = spawn_canned_http_origin(CANNED_RESPONSE).await.unwrap();
    let master_key = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: None,
        key_path: None,
        proxy: ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() },
        master_key: Some(master_key.clone()),
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() },
        master_key: Some(master_key),
        insecure_tls: false,
    })
    .await
    .unwrap();
    let client_addr = client.local_addr().unwrap();
    tokio::spawn(client.run());

    let mut app = TcpStream::connect(client_addr).await.unwrap();
    let request = format!(
        "GET http://127.0.0.1:{}/widgets?x=1 HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n",
        origin_addr.port(),
        origin_addr.port()
    );
    app.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        app.read_exact(&mut byte).await.unwrap();
        response.push(byte[0]);
    }
    let mut body = [0u8; 2];
    app.read_exact(&mut body).await.unwrap();
    assert_eq!(&body, b"ok");
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200 OK"));

    let received = origin_request_rx.await.unwrap();
    let received = String::from_utf8_lossy(&received);
    assert!(
        received.starts_with("GET /widgets?x=1 HTTP/1.1\r\n"),
        "origin should see an abs-path request line, got: {received}"
    );
    assert!(!received.to_ascii_lowercase().contains("proxy-connection"), "hop-by-hop headers must be stripped");
}

#[tokio::test]
async fn plain_http_pipelined_requests_both_rewritten_in_order() {
    let (origin_addr, origin_requests_rx) =
        spawn_pipelined_http_origin([CANNED_RESPONSE, CANNED_RESPONSE]).await.unwrap();
    let master_key = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: None,
        key_path: None,
        proxy: ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() },
        master_key: Some(master_key.clone()),
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() },
        master_key: Some(master_key),
        insecure_tls: false,
    })
    .await
    .unwrap();
    let client_addr = client.local_addr().unwrap();
    tokio::spawn(client.run());

    let mut app = TcpStream::connect(client_addr).await.unwrap();
    let first = format!(
        "GET http://127.0.0.1:{}/first HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nConnection: keep-alive\r\n\r\n",
        origin_addr.port(),
        origin_addr.port()
    );
    app.write_all(first.as_bytes()).await.unwrap();

    let mut body = [0u8; 2];
    for i in 0..2 {
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        while !response.ends_with(b"\r\n\r\n") {
            app.read_exact(&mut byte).await.unwrap();
            response.push(byte[0]);
        }
        app.read_exact(&mut body).await.unwrap();
        assert_eq!(&body, b"ok");
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200 OK"));

        if i == 0 {
            let second = format!(
                "GET http://127.0.0.1:{}/second HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nConnection: keep-alive\r\n\r\n",
                origin_addr.port(),
                origin_addr.port()
            );
            app.write_all(second.as_bytes()).await.unwrap();
        }
    }

    let [first_received, second_received] = origin_requests_rx.await.unwrap();
    let first_received = String::from_utf8_lossy(&first_received);
    let second_received = String::from_utf8_lossy(&second_received);
    assert!(
        first_received.starts_with("GET /first HTTP/1.1\r\n"),
        "first pipelined request should be rewritten to abs-path, got: {first_received}"
    );
    assert!(
        second_received.starts_with("GET /second HTTP/1.1\r\n"),
        "second pipelined request should be rewritten to abs-path, got: {second_received}"
    );
    assert!(first_received.to_ascii_lowercase().contains("connection: keep-alive"));
    assert!(second_received.to_ascii_lowercase().contains("connection: keep-alive"));
}
