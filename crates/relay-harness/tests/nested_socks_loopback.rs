//! A downstream app speaks SOCKS5 to the client; the client re-tunnels
//! that as a *nested* SOCKS5 CONNECT to the relay server, which demuxes
//! it the same way a downstream app's request would be.

use relay_client::{Client, ClientRuntimeConfig};
use relay_core::ProxyConfig;
use relay_harness::{read_socks5_connect_reply, read_socks5_method_reply, socks5_connect_request_domain, spawn_echo_origin};
use relay_proto::Method;
use relay_server::{Server, ServerRuntimeConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

#[tokio::test]
async fn app_to_origin_round_trip_over_nested_socks5() {
    let origin_addr = spawn_echo_origin().await.unwrap();

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: None,
        key_path: None,
        proxy: ProxyConfig { method: Method::Socks5, ..Default::default() },
        master_key: None,
    })
    .await
    .unwrap();
    let server_addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = Client::bind(ClientRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        relay_address: server_addr.to_string(),
        proxy: ProxyConfig { method: Method::Socks5, ..Default::default() },
        master_key: None,
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
    assert_eq!(read_socks5_connect_reply(&mut app).await.unwrap(), 0x00);

    app.write_all(b"nested socks5 round trip").await.unwrap();
    let mut echoed = [0u8; 24];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"nested socks5 round trip");
}

#[tokio::test]
async fn credentials_required_by_server_are_forwarded_by_client() {
    let origin_addr = spawn_echo_origin().await.unwrap();

    let server = Server::bind(ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        cert_path: None,
        key_path: None,
        proxy: ProxyConfig {
            method: Method::Socks5,
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
            method: Method::Socks5,
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        },
        master_key: None,
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
    assert_eq!(read_socks5_connect_reply(&mut app).await.unwrap(), 0x00);

    app.write_all(b"ok").await.unwrap();
    let mut echoed = [0u8; 2];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ok");
}
