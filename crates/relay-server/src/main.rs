//! Relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Shadowsocks-AEAD, self-signed-free plaintext listener (development)
//! relay-server --bind 0.0.0.0:8443 --method shadowsocks --cipher aes-256-gcm --password hunter2
//!
//! # HTTP/1.1 CONNECT over TLS (production)
//! relay-server --bind 0.0.0.0:8443 --method http1-connect --cert cert.pem --key key.pem
//! ```

use std::time::Duration;

use clap::Parser;
use relay_core::ProxyConfig;
use relay_crypto::MasterKey;
use relay_proto::{CipherKind, Method};
use relay_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Remote-side tunnel-terminating proxy server
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Remote-side tunnel-terminating proxy server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8443")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Upstream transport: socks4, socks4a, socks5, socks5h, http1-connect,
    /// http2-connect, or shadowsocks
    #[arg(long, default_value = "socks5")]
    method: String,

    /// AEAD cipher for the shadowsocks method (aes-128-gcm, aes-256-gcm,
    /// chacha20-ietf-poly1305, xchacha20-ietf-poly1305, ...)
    #[arg(long, default_value = "aes-256-gcm")]
    cipher: String,

    /// Shadowsocks passphrase; required when --method shadowsocks
    #[arg(long)]
    password: Option<String>,

    /// Proxy-Authorization username required from downstream clients
    #[arg(long)]
    username: Option<String>,

    /// Proxy-Authorization password required from downstream clients
    #[arg(long)]
    proxy_password: Option<String>,

    /// Negotiate the padding obfuscator
    #[arg(long)]
    padding_support: bool,

    /// Suppress the Via header on forwarded plain-HTTP requests
    #[arg(long)]
    hide_via: bool,

    /// Suppress the Forwarded header on forwarded plain-HTTP requests
    #[arg(long)]
    hide_ip: bool,

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

    tracing::info!("relay server starting");
    tracing::info!(bind = %args.bind, method = %args.method, "configuration loaded");

    if args.cert.is_none() && args.key.is_none() && matches!(args.method.as_str(), "http1-connect" | "http1" | "http2-connect" | "http2") {
        tracing::warn!("no TLS certificate provided for an HTTP CONNECT method - accepting plaintext");
    }

    let cipher: CipherKind = args.cipher.parse()?;
    let method = parse_method(&args.method, cipher)?;

    let master_key = match method {
        Method::ShadowsocksAead(kind) => {
            let password = args
                .password
                .ok_or("--password is required when --method shadowsocks is selected")?;
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
        hide_via: args.hide_via,
        hide_ip: args.hide_ip,
        tls_cert_path: args.cert.clone(),
        tls_key_path: args.key.clone(),
    };

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        proxy,
        master_key,
    };

    let server = Server::bind(config).await?;

    tracing::info!(addr = %server.local_addr()?, "server listening");

    server.run().await?;

    Ok(())
}
