//! Per-connection configuration, sampled once from process-wide flags at
//! connect time and shared immutably thereafter.

use std::{sync::Arc, time::Duration};

use relay_proto::Method;

/// Immutable configuration shared by every connection spawned from one
/// listener. Cheaply cloned via `Arc`.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Transport used to reach the upstream/origin.
    pub method: Method,
    /// Proxy-authentication username, if credentials are required.
    pub username: Option<String>,
    /// Proxy-authentication password, if credentials are required.
    pub password: Option<String>,
    /// Whether both sides negotiate the padding obfuscator.
    pub padding_support: bool,
    /// Timeout for establishing the upstream/origin connection.
    pub connect_timeout: Duration,
    /// Optional download rate limit in bytes/sec; `0` disables throttling.
    pub limit_rate_down: u64,
    /// Optional upload rate limit in bytes/sec; `0` disables throttling.
    pub limit_rate_up: u64,
    /// Suppress the `Via` header on plain-HTTP requests forwarded by the
    /// server handler.
    pub hide_via: bool,
    /// Suppress the `Forwarded` header on plain-HTTP requests forwarded by
    /// the server handler.
    pub hide_ip: bool,
    /// Server-side TLS certificate chain path, PEM-encoded; `None` runs a
    /// plaintext listener.
    pub tls_cert_path: Option<String>,
    /// Server-side TLS private key path, PEM-encoded.
    pub tls_key_path: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            method: Method::Socks5,
            username: None,
            password: None,
            padding_support: false,
            connect_timeout: Duration::from_secs(10),
            limit_rate_down: 0,
            limit_rate_up: 0,
            hide_via: false,
            hide_ip: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ProxyConfig {
    /// Wrap in an `Arc` for cheap sharing across spawned connection tasks.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Whether `Proxy-Authorization`/credentials should be checked or
    /// sent for this configuration.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_auth_and_no_padding() {
        let cfg = ProxyConfig::default();
        assert!(!cfg.requires_auth());
        assert!(!cfg.padding_support);
    }

    #[test]
    fn requires_auth_when_either_credential_is_set() {
        let mut cfg = ProxyConfig { username: Some("alice".into()), ..Default::default() };
        assert!(cfg.requires_auth());
        cfg.username = None;
        cfg.password = Some("hunter2".into());
        assert!(cfg.requires_auth());
    }
}
