//! Relay client binary.
//!
//! # Usage
//!
//! ```bash
//! # Shadowsocks-AEAD upstream transport (development)
//! relay-client --bind 127.0.0.1:1080 --relay relay.example.com:8443 \
//!     --method shadowsocks --cipher aes-256-gcm --password hunter2
//!
//! # HTTP/1.1 CONNECT over TLS upstream (production)
//! relay-client --bind 127.0.0.1:1080 --relay relay.example.com:8443 \
//!     --method http1-connect --username alice --proxy-password hunter2
//! ```

use std::time::Duration;

use clap::Parser;
use relay_client::{Client, ClientRuntimeConfig};
use relay_core::ProxyConfig;
use relay_crypto::MasterKey;
use relay_proto::{CipherKind, Method};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Local-side forward proxy, tunneling to a remote relay server
#[derive(Parser, Debug)]
#[command(name = "relay-client")]
#[command(about = "Local-side forward proxy, tunneling to a remote relay server")]
#[command(version)]
struct Args {
    /// Local address to listen on for application connections
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    bind: String,

    /// Address of the remote relay server
    #[arg(short, long)]
    relay: String,

    /// Upstream transport: socks4, socks4a, socks5, socks5h, http1-connect,
    /// http2-connect, or shadowsocks
    #[arg(long, default_value = "shadowsocks")]
    method: String,

    /// AEAD cipher for the shadowsocks method (aes-128-gcm, aes-256-gcm,
    /// chacha20-ietf-poly1305, xchacha20-ietf-poly1305, ...)
    #[arg(long, default_value = "aes-256-gcm")]
    cipher: String,

    /// Shadowsocks passphrase; required when --method shadowsocks
    #[arg(long)]
    password: Option<String>,

    /// Proxy-Authorization / SOCKS5 username sent to the relay server
    #[arg(long)]
    username: Option<String>,

    /// Proxy-Authorization / SOCKS5 password sent to the relay server
    #[arg(long)]
    proxy_password: Option<String>,

    /// Negotiate the padding obfuscator
    #[arg(long)]
    padding_support: bool,

    /// Accept any TLS certificate from the relay server (development only)
    #[arg(long)]
    insecure_tls: bool,

    /// Upstream connect timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_method(raw: &str, cipher: CipherKind) -> Result<Method, String> {
    match raw.to_ascii_lowercase().as_str() {
        "socks4" => Ok(Method::Socks4),
        "socks4a" => Ok(Method::Socks4a),
        "socks5" => Ok(Method::Socks5),
        "socks5h" => Ok(Method::Socks5h),
        "http1-connect" | "http1" => Ok(Method::Http1Connect),
        "http2-connect" | "http2" => Ok(Method::Http2Connect),
        "shadowsocks" | "shadowsocks-aead" | "ss" => Ok(Method::ShadowsocksAead(cipher)),
        other => Err(format!("unknown method '{other}'")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("relay client starting");
    tracing::info!(bind = %args.bind, relay = %args.relay, method = %args.method, "configuration loaded");

    let cipher: CipherKind = args.cipher.parse()?;
    let method = parse_method(&args.method, cipher)?;

    let master_key = match method {
        Method::ShadowsocksAead(kind) => {
            let password = args.password.ok_or("--password is required when --method shadowsocks is selected")?;
            Some(MasterKey::from_passphrase(&password, kind))
        },
        _ => None,
    };

    let proxy = ProxyConfig {
        method,
        username: args.username,
        password: args.proxy_password,
        padding_support: args.padding_support,
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
        limit_rate_down: 0,
        limit_rate_up: 0,
        hide_via: false,
        hide_ip: false,
        tls_cert_path: None,
        tls_key_path: None,
    };

    let config = ClientRuntimeConfig {
        bind_address: args.bind,
        relay_address: args.relay,
        proxy,
        master_key,
        insecure_tls: args.insecure_tls,
    };

    let client = Client::bind(config).await?;
    tracing::info!(addr = %client.local_addr()?, "client listening");
    client.run().await?;

    Ok(())
}
