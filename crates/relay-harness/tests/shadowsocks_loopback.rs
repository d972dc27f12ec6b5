//! A downstream app speaks SOCKS5 to the client; the client tunnels to
//! the relay server over shadowsocks-AEAD; the server dials a plain TCP
//! echo origin.

use relay_client::{Client, ClientRuntimeConfig};
use relay_core::ProxyConfig;
use relay_crypto::MasterKey;
use relay_harness::{read_socks5_connect_reply, read_socks5_method_reply, socks5_connect_request_domain, spawn_echo_origin};
use relay_proto::{CipherKind, Method};
use relay_server::{Server, ServerRuntimeConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

#[tokio::test]
async fn app_to_origin_round_trip_over_shadowsocks() {
    let origin_addr = spawn_echo_origin().await.unwrap();
    let master_key = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);

    let server_proxy = ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() };
    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: None,
        key_path: None,
        proxy: server_proxy,
        master_key: Some(master_key.clone()),
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client_proxy = ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() };
    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: client_proxy,
        master_key: Some(master_key),
        insecure_tls: false,
    })
    .await
    .unwrap();
    let client_addr = client.local_addr().unwrap();
    tokio::spawn(client.run());

    let mut app = TcpStream::connect(client_addr).await.unwrap();
    app.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_socks5_method_reply(&mut app).await.unwrap(), 0x00);

    app.write_all(&socks5_connect_request_domain("127.0.0.1", origin_addr.port())).await.unwrap();
    assert_eq!(read_socks5_connect_reply(&mut app).await.unwrap(), 0x00, "CONNECT should succeed");

    app.write_all(b"hello through shadowsocks").await.unwrap();
    let mut echoed = [0u8; 25];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello through shadowsocks");
}

#[tokio::test]
async fn connect_to_dead_origin_reports_failure_through_socks5() {
    // Nobody is listening on this port; relay-server's dial will fail and
    // the client must turn that into a SOCKS5 failure reply rather than
    // hanging or tearing down the connection silently.
    let dead_addr = "127.0.0.1:1";
    let master_key = MasterKey::from_passphrase("hunter2", CipherKind::Aes256Gcm);

    let server_proxy = ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() };
    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: None,
        key_path: None,
        proxy: server_proxy,
        master_key: Some(master_key.clone()),
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client_proxy = ProxyConfig { method: Method::ShadowsocksAead(CipherKind::Aes256Gcm), ..Default::default() };
    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: client_proxy,
        master_key: Some(master_key),
        insecure_tls: false,
    })
    .await
    .unwrap();
    let client_addr = client.local_addr().unwrap();
    tokio::spawn(client.run());

    let (dead_host, dead_port) = dead_addr.rsplit_once(':').unwrap();
    let mut app = TcpStream::connect(client_addr).await.unwrap();
    app.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    assert_eq!(read_socks5_method_reply(&mut app).await.unwrap(), 0x00);

    app.write_all(&socks5_connect_request_domain(dead_host, dead_port.parse().unwrap())).await.unwrap();
    let status = read_socks5_connect_reply(&mut app).await.unwrap();
    assert_ne!(status, 0x00, "CONNECT to an unreachable origin must not report success");
}
