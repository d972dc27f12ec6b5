//! Server-side connection state machine: demultiplexes the tunnel
//! transport, parses the inner destination, and decides what to dial at
//! the origin.
//!
//! The shadowsocks-AEAD and SOCKS paths are handled directly here; the
//! HTTP/1 and HTTP/2 CONNECT paths lean on the same thin request-line
//! extraction used by the client handler (`relay-core::client`) and on
//! [`crate::h2_tunnel`] respectively, since the HTTP/1 and HTTP/2 frame
//! grammars themselves are external collaborators.

use std::sync::Arc;

use relay_crypto::MasterKey;
use relay_proto::{
    Destination,
    http::{self, CONNECT_SUCCESS_RESPONSE, verify_basic_auth},
    socks4::{Socks4Reply, Socks4Request},
    socks5::{self, ConnectReply, ConnectRequest, MethodSelectRequest, Socks5Status},
};

use crate::{
    aead_codec::Decoder,
    config::ProxyConfig,
    error::{RelayError, Result},
};

/// Where the server-side handler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Demultiplexing the incoming tunnel transport.
    Handshake,
    /// Destination resolved; waiting for the origin dial to complete.
    AwaitingOrigin,
    /// Origin connected; bytes now flow as an opaque stream.
    Stream,
    /// Terminal.
    Closed,
}

/// Actions the driver must execute in response to a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send these bytes to the downstream (tunnel) socket.
    ReplyToDownstream(Vec<u8>),
    /// Dial this destination at the origin.
    Dial(Destination),
    /// Forward these already-decrypted bytes to the origin (used when a
    /// shadowsocks-AEAD record carries application data past the
    /// destination header, or once the destination has been resolved).
    ForwardToOrigin(Vec<u8>),
    /// Abort the connection.
    Close {
        /// Human-readable reason, for logging.
        reason: String,
    },
}

enum DemuxedTransport {
    ShadowsocksAead(Box<Decoder>),
    Http1Connect,
    Http1Plain,
    Socks4,
    Socks5AwaitingUserPass,
    Socks5,
}

/// Sans-I/O server-side handler.
pub struct ServerConnection {
    config: Arc<ProxyConfig>,
    state: ServerState,
    transport: Option<DemuxedTransport>,
    destination: Option<Destination>,
    /// Bytes still expected to complete the in-flight plain-HTTP
    /// request/response body while keep-alive tracking is active; `None`
    /// once it's disabled. Mirrors [`crate::client::ClientConnection`]'s
    /// field of the same name.
    http_keep_alive: Option<i64>,
}

impl ServerConnection {
    /// A fresh handler in [`ServerState::Handshake`].
    #[must_use]
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config, state: ServerState::Handshake, transport: None, destination: None, http_keep_alive: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The destination resolved by the handshake, once known.
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Demultiplex the shadowsocks-AEAD transport: the first bytes are the
    /// salt followed by one `ss::request` destination header. `master_key`
    /// is the cipher's pre-shared key.
    pub fn handle_shadowsocks_bytes(
        &mut self,
        input: &[u8],
        kind: relay_proto::CipherKind,
        master_key: MasterKey,
    ) -> Result<Vec<ServerAction>> {
        let mut decoder = match self.transport.take() {
            Some(DemuxedTransport::ShadowsocksAead(decoder)) => decoder,
            _ => Box::new(Decoder::new(kind, master_key)),
        };

        let plaintexts = decoder.decode(input)?;
        let joined: Vec<u8> = plaintexts.concat();

        if self.destination.is_none() {
            let result = match Destination::parse(&joined) {
                Ok((destination, consumed)) => {
                    self.destination = Some(destination.clone());
                    self.state = ServerState::AwaitingOrigin;
                    let mut actions = vec![ServerAction::Dial(destination)];
                    if consumed < joined.len() {
                        actions.push(ServerAction::ForwardToOrigin(joined[consumed..].to_vec()));
                    }
                    Ok(actions)
                },
                Err(relay_proto::ProtocolError::Incomplete { .. }) => Ok(Vec::new()),
                Err(e) => Err(e.into()),
            };
            self.transport = Some(DemuxedTransport::ShadowsocksAead(decoder));
            return result;
        }

        self.transport = Some(DemuxedTransport::ShadowsocksAead(decoder));
        if joined.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![ServerAction::ForwardToOrigin(joined)])
        }
    }

    /// Demultiplex a nested SOCKS4/4a or SOCKS5 dialogue (symmetric to the
    /// client handler's own parsing).
    pub fn handle_socks_bytes(&mut self, input: &[u8]) -> Result<Vec<ServerAction>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        match self.transport {
            Some(DemuxedTransport::Socks5AwaitingUserPass) => self.handle_socks5_user_pass(input),
            Some(DemuxedTransport::Socks5) => self.handle_socks5_connect(input),
            _ => match input[0] {
                0x04 => {
                    let (request, _) = Socks4Request::parse(input)?;
                    self.transport = Some(DemuxedTransport::Socks4);
                    self.destination = Some(request.destination.clone());
                    self.state = ServerState::AwaitingOrigin;
                    Ok(vec![ServerAction::Dial(request.destination)])
                },
                0x05 => {
                    let (method_select, _) = MethodSelectRequest::parse(input)?;
                    if self.config.requires_auth() {
                        if !method_select.offers_user_pass() {
                            self.state = ServerState::Closed;
                            return Ok(vec![
                                ServerAction::ReplyToDownstream(
                                    socks5::encode_method_reply(socks5::method::NO_ACCEPTABLE).to_vec(),
                                ),
                                ServerAction::Close { reason: "no acceptable SOCKS5 auth method".into() },
                            ]);
                        }
                        self.transport = Some(DemuxedTransport::Socks5AwaitingUserPass);
                        return Ok(vec![ServerAction::ReplyToDownstream(
                            socks5::encode_method_reply(socks5::method::USER_PASS).to_vec(),
                        )]);
                    }
                    if !method_select.offers_no_auth() {
                        self.state = ServerState::Closed;
                        return Ok(vec![
                            ServerAction::ReplyToDownstream(
                                socks5::encode_method_reply(socks5::method::NO_ACCEPTABLE).to_vec(),
                            ),
                            ServerAction::Close { reason: "no acceptable SOCKS5 auth method".into() },
                        ]);
                    }
                    self.transport = Some(DemuxedTransport::Socks5);
                    Ok(vec![ServerAction::ReplyToDownstream(
                        socks5::encode_method_reply(socks5::method::NO_AUTH).to_vec(),
                    )])
                },
                _ => Err(RelayError::InvalidArgument),
            },
        }
    }

    fn handle_socks5_user_pass(&mut self, input: &[u8]) -> Result<Vec<ServerAction>> {
        let (request, _) = socks5::UserPassRequest::parse(input)?;
        let (expected_user, expected_pass) = (
            self.config.username.as_deref().unwrap_or_default(),
            self.config.password.as_deref().unwrap_or_default(),
        );
        let ok = request.username == expected_user.as_bytes() && request.password == expected_pass.as_bytes();
        if !ok {
            self.state = ServerState::Closed;
            return Ok(vec![
                ServerAction::ReplyToDownstream(socks5::encode_user_pass_reply(false).to_vec()),
                ServerAction::Close { reason: "SOCKS5 username/password rejected".into() },
            ]);
        }

        self.transport = Some(DemuxedTransport::Socks5);
        Ok(vec![ServerAction::ReplyToDownstream(socks5::encode_user_pass_reply(true).to_vec())])
    }

    fn handle_socks5_connect(&mut self, input: &[u8]) -> Result<Vec<ServerAction>> {
        let (request, _) = ConnectRequest::parse(input)?;
        self.destination = Some(request.destination.clone());
        self.state = ServerState::AwaitingOrigin;
        Ok(vec![ServerAction::Dial(request.destination)])
    }

    /// Demultiplex an HTTP/1.1 request: CONNECT (with optional
    /// `Proxy-Authorization` check) or plain HTTP with host/port
    /// extraction and `Forwarded`/`Via` header injection.
    pub fn handle_http1_bytes(&mut self, input: &[u8]) -> Result<(Vec<ServerAction>, Option<Vec<u8>>)> {
        let text = std::str::from_utf8(input).map_err(|_| RelayError::InvalidArgument)?;
        let Some(header_end) = text.find("\r\n\r\n") else {
            return Ok((Vec::new(), None));
        };
        let head = &text[..header_end];
        let trailing = &input[header_end + 4..];
        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(RelayError::InvalidArgument)?;
        let mut parts = request_line.split(' ');
        let method = parts.next().ok_or(RelayError::InvalidArgument)?;
        let target = parts.next().ok_or(RelayError::InvalidArgument)?;

        let headers: Vec<&str> = lines.collect();
        let proxy_auth =
            headers.iter().find_map(|line| line.strip_prefix("Proxy-Authorization:")).map(str::trim);

        if method.eq_ignore_ascii_case("CONNECT") {
            if self.config.requires_auth() {
                let (user, pass) = (
                    self.config.username.as_deref().unwrap_or_default(),
                    self.config.password.as_deref().unwrap_or_default(),
                );
                let ok = proxy_auth
                    .and_then(|value| value.strip_prefix("basic ").or_else(|| value.strip_prefix("Basic ")))
                    .is_some_and(|value| verify_basic_auth(value, user, pass));
                if !ok {
                    self.state = ServerState::Closed;
                    return Ok((
                        vec![ServerAction::Close { reason: "proxy authorization mismatch".into() }],
                        None,
                    ));
                }
            }
            let destination = parse_host_port(target)?;
            self.transport = Some(DemuxedTransport::Http1Connect);
            self.destination = Some(destination.clone());
            self.state = ServerState::AwaitingOrigin;
            self.http_keep_alive = None;
            let forward = if trailing.is_empty() { None } else { Some(trailing.to_vec()) };
            return Ok((vec![ServerAction::Dial(destination)], forward));
        }

        let host_header = headers
            .iter()
            .find_map(|line| line.strip_prefix("Host:").or_else(|| line.strip_prefix("host:")))
            .map(str::trim);
        let host_port = if target.starts_with("http://") {
            http::host_port_from_absolute_uri(target)
        } else {
            host_header.map(str::to_string)
        }
        .ok_or(RelayError::InvalidArgument)?;
        let destination = parse_host_port(&host_port)?;

        self.transport = Some(DemuxedTransport::Http1Plain);
        self.destination = Some(destination.clone());
        self.state = ServerState::AwaitingOrigin;

        let keep_alive_info = http::inspect_keep_alive(&headers);
        self.http_keep_alive = if keep_alive_info.keep_alive {
            Some(keep_alive_info.content_length as i64 - trailing.len() as i64)
        } else {
            None
        };

        let mut rewritten = self.rewrite_for_origin(request_line, &headers, keep_alive_info.keep_alive);
        rewritten.extend_from_slice(trailing);
        Ok((vec![ServerAction::Dial(destination)], Some(rewritten)))
    }

    /// Re-parse a pipelined plain-HTTP request arriving on an
    /// already-dialed keep-alive tunnel. Reuses the existing destination,
    /// same simplification as [`crate::client::ClientConnection::handle_http_pipelined_bytes`].
    pub fn handle_http1_pipelined_bytes(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let Ok(text) = std::str::from_utf8(input) else {
            self.http_keep_alive = None;
            return Ok(input.to_vec());
        };
        let Some(header_end) = text.find("\r\n\r\n") else {
            self.http_keep_alive = None;
            return Ok(input.to_vec());
        };
        let head = &text[..header_end];
        let trailing = &input[header_end + 4..];
        let mut lines = head.split("\r\n");
        let Some(request_line) = lines.next() else {
            self.http_keep_alive = None;
            return Ok(input.to_vec());
        };
        let headers: Vec<&str> = lines.collect();

        let keep_alive_info = http::inspect_keep_alive(&headers);
        self.http_keep_alive = if keep_alive_info.keep_alive {
            Some(keep_alive_info.content_length as i64 - trailing.len() as i64)
        } else {
            None
        };

        let mut rewritten = self.rewrite_for_origin(request_line, &headers, keep_alive_info.keep_alive);
        rewritten.extend_from_slice(trailing);
        Ok(rewritten)
    }

    /// Bytes remaining in the in-flight plain-HTTP request/response body
    /// while keep-alive tracking is active; `None` once it's been
    /// disabled.
    #[must_use]
    pub fn http_keep_alive_remaining(&self) -> Option<i64> {
        self.http_keep_alive
    }

    /// Record `n` bytes forwarded to the origin while keep-alive tracking
    /// is active; a no-op otherwise.
    pub fn note_http_bytes_forwarded(&mut self, n: usize) {
        if let Some(remaining) = self.http_keep_alive.as_mut() {
            *remaining -= n as i64;
        }
    }

    fn rewrite_for_origin(&self, request_line: &str, headers: &[&str], keep_alive: bool) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(request_line);
        out.push_str("\r\n");
        for line in headers {
            let Some((name, _)) = line.split_once(':') else { continue };
            if http::is_hop_by_hop_header(name.trim()) {
                continue;
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
        if keep_alive {
            out.push_str("Connection: keep-alive\r\n");
        }
        if !self.config.hide_ip {
            out.push_str(&http::forwarded_header_value("downstream"));
            out.push_str("\r\n");
        }
        if !self.config.hide_via {
            out.push_str(&http::via_header_value("asio"));
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// The origin connection succeeded; finish the downstream-visible
    /// handshake.
    pub fn origin_connected(&mut self) -> Vec<ServerAction> {
        self.state = ServerState::Stream;
        match self.transport {
            Some(DemuxedTransport::Socks4) => {
                vec![ServerAction::ReplyToDownstream(Socks4Reply::granted().encode().to_vec())]
            },
            Some(DemuxedTransport::Socks5) => {
                vec![ServerAction::ReplyToDownstream(ConnectReply::succeeded().encode())]
            },
            Some(DemuxedTransport::Http1Connect) => {
                vec![ServerAction::ReplyToDownstream(CONNECT_SUCCESS_RESPONSE.as_bytes().to_vec())]
            },
            Some(
                DemuxedTransport::Http1Plain
                | DemuxedTransport::ShadowsocksAead(_)
                | DemuxedTransport::Socks5AwaitingUserPass,
            )
            | None => Vec::new(),
        }
    }

    /// The origin dial failed.
    pub fn origin_failed(&mut self, reason: &str) -> Vec<ServerAction> {
        self.state = ServerState::Closed;
        let mut actions = match self.transport {
            Some(DemuxedTransport::Socks4) => {
                vec![ServerAction::ReplyToDownstream(Socks4Reply::failed().encode().to_vec())]
            },
            Some(DemuxedTransport::Socks5) => vec![ServerAction::ReplyToDownstream(
                ConnectReply::failed(Socks5Status::HostUnreachable).encode(),
            )],
            _ => Vec::new(),
        };
        actions.push(ServerAction::Close { reason: reason.to_string() });
        actions
    }
}

fn parse_host_port(host_port: &str) -> Result<Destination> {
    // A bare `Host: example.com` header (no `:port`) means the default HTTP
    // port; only CONNECT targets and absolute URIs with an explicit port
    // reach this function with one already attached.
    let Some((host, port_str)) = host_port.rsplit_once(':') else {
        return Ok(Destination::domain(host_port, 80)?);
    };
    let port: u16 = port_str.parse().map_err(|_| RelayError::InvalidArgument)?;
    if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<std::net::IpAddr>() {
        return Ok(Destination::from(std::net::SocketAddr::new(ip, port)));
    }
    Ok(Destination::domain(host, port)?)
}

#[cfg(test)]
mod tests {
    use relay_proto::CipherKind;

    use super::*;

    fn cfg() -> Arc<ProxyConfig> {
        Arc::new(ProxyConfig::default())
    }

    #[test]
    fn socks5_no_auth_then_connect() {
        let mut conn = ServerConnection::new(cfg());
        conn.handle_socks_bytes(&[0x05, 0x01, 0x00]).unwrap();

        let mut request = vec![0x05, 0x01, 0x00, 0x01];
        request.extend_from_slice(&[1, 2, 3, 4]);
        request.extend_from_slice(&80u16.to_be_bytes());
        let actions = conn.handle_socks_bytes(&request).unwrap();
        assert_eq!(conn.state(), ServerState::AwaitingOrigin);
        assert!(matches!(&actions[0], ServerAction::Dial(_)));

        let actions = conn.origin_connected();
        assert_eq!(conn.state(), ServerState::Stream);
        assert!(matches!(&actions[0], ServerAction::ReplyToDownstream(_)));
    }

    #[test]
    fn socks5_user_pass_accepted_when_required() {
        let cfg = Arc::new(ProxyConfig { username: Some("alice".into()), password: Some("hunter2".into()), ..Default::default() });
        let mut conn = ServerConnection::new(cfg);
        let actions = conn.handle_socks_bytes(&[0x05, 0x01, 0x02]).unwrap();
        assert_eq!(actions, vec![ServerAction::ReplyToDownstream(vec![0x05, 0x02])]);

        let request = socks5::UserPassRequest { username: b"alice".to_vec(), password: b"hunter2".to_vec() };
        let actions = conn.handle_socks_bytes(&request.encode()).unwrap();
        assert_eq!(actions, vec![ServerAction::ReplyToDownstream(vec![0x01, 0x00])]);

        let mut request = vec![0x05, 0x01, 0x00, 0x01];
        request.extend_from_slice(&[1, 2, 3, 4]);
        request.extend_from_slice(&80u16.to_be_bytes());
        let actions = conn.handle_socks_bytes(&request).unwrap();
        assert_eq!(conn.state(), ServerState::AwaitingOrigin);
        assert!(matches!(&actions[0], ServerAction::Dial(_)));
    }

    #[test]
    fn socks5_user_pass_rejected_with_wrong_credentials() {
        let cfg = Arc::new(ProxyConfig { username: Some("alice".into()), password: Some("hunter2".into()), ..Default::default() });
        let mut conn = ServerConnection::new(cfg);
        conn.handle_socks_bytes(&[0x05, 0x01, 0x02]).unwrap();

        let request = socks5::UserPassRequest { username: b"alice".to_vec(), password: b"wrong".to_vec() };
        let actions = conn.handle_socks_bytes(&request.encode()).unwrap();
        assert_eq!(conn.state(), ServerState::Closed);
        assert!(matches!(&actions[0], ServerAction::ReplyToDownstream(reply) if reply[1] == 0x01));
        assert!(matches!(&actions[1], ServerAction::Close { .. }));
    }

    #[test]
    fn socks5_method_select_rejects_no_auth_when_auth_required() {
        let cfg = Arc::new(ProxyConfig { username: Some("alice".into()), password: Some("hunter2".into()), ..Default::default() });
        let mut conn = ServerConnection::new(cfg);
        let actions = conn.handle_socks_bytes(&[0x05, 0x01, 0x00]).unwrap();
        assert_eq!(conn.state(), ServerState::Closed);
        assert!(matches!(&actions[0], ServerAction::ReplyToDownstream(reply) if reply[1] == 0xff));
    }

    #[test]
    fn shadowsocks_salt_and_destination_dial() {
        let kind = CipherKind::Aes256Gcm;
        let key = MasterKey::from_passphrase("shared secret", kind);

        let mut encoder = crate::aead_codec::Encoder::new(kind, MasterKey::from_passphrase("shared secret", kind));
        let mut dest_bytes = Vec::new();
        Destination::domain("example.com", 443).unwrap().encode(&mut dest_bytes);
        let mut wire = crate::queue::BufferQueue::new();
        encoder.encode(&dest_bytes, &mut wire).unwrap();
        let bytes = wire.drain_bytes(wire.byte_sum());

        let mut conn = ServerConnection::new(cfg());
        let actions = conn.handle_shadowsocks_bytes(&bytes, kind, key).unwrap();
        assert_eq!(conn.state(), ServerState::AwaitingOrigin);
        assert_eq!(conn.destination(), Some(&Destination::domain("example.com", 443).unwrap()));
        assert!(matches!(&actions[0], ServerAction::Dial(_)));
    }

    #[test]
    fn http1_connect_without_required_auth_is_closed() {
        let cfg = Arc::new(ProxyConfig {
            username: Some("alice".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        });
        let mut conn = ServerConnection::new(cfg);
        let request = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n";
        let (actions, forward) = conn.handle_http1_bytes(request).unwrap();
        assert_eq!(conn.state(), ServerState::Closed);
        assert!(forward.is_none());
        assert!(matches!(&actions[0], ServerAction::Close { .. }));
    }

    #[test]
    fn http1_plain_rewrites_with_forwarded_and_via() {
        let mut conn = ServerConnection::new(cfg());
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nProxy-Connection: keep-alive\r\n\r\n";
        let (actions, forward) = conn.handle_http1_bytes(request).unwrap();
        assert!(matches!(&actions[0], ServerAction::Dial(_)));
        let forwarded = forward.unwrap();
        let text = String::from_utf8(forwarded).unwrap();
        assert!(!text.contains("Proxy-Connection"));
        assert!(text.contains("Connection: keep-alive"));
        assert!(text.contains("Forwarded:"));
        assert!(text.contains("Via: 1.1 asio"));
        assert_eq!(conn.http_keep_alive_remaining(), Some(0));
    }

    #[test]
    fn http1_plain_forwards_trailing_bytes_from_same_read() {
        let mut conn = ServerConnection::new(cfg());
        let request = b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello";
        let (_actions, forward) = conn.handle_http1_bytes(request).unwrap();
        let forwarded = forward.unwrap();
        let text = String::from_utf8(forwarded).unwrap();
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn http1_connect_forwards_trailing_bytes_from_same_read() {
        let mut conn = ServerConnection::new(cfg());
        let mut request = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n".to_vec();
        request.extend_from_slice(b"\x16\x03\x01extra-tls-bytes");
        let (actions, forward) = conn.handle_http1_bytes(&request).unwrap();
        assert!(matches!(&actions[0], ServerAction::Dial(_)));
        assert_eq!(forward.unwrap(), b"\x16\x03\x01extra-tls-bytes");
    }

    #[test]
    fn http1_pipelined_request_reuses_destination() {
        let mut conn = ServerConnection::new(cfg());
        let request = b"GET /first HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\n";
        conn.handle_http1_bytes(request).unwrap();
        assert_eq!(conn.http_keep_alive_remaining(), Some(0));

        let next = b"GET /second HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\n";
        let rewritten = conn.handle_http1_pipelined_bytes(next).unwrap();
        let text = String::from_utf8(rewritten).unwrap();
        assert!(text.starts_with("GET /second HTTP/1.1\r\n"));
        assert!(text.contains("Connection: keep-alive"));
        assert_eq!(conn.destination(), Some(&Destination::domain("example.com", 80).unwrap()));
    }

    #[test]
    fn http1_pipelined_request_without_keep_alive_disables_tracking() {
        let mut conn = ServerConnection::new(cfg());
        let request = b"GET /first HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\n";
        conn.handle_http1_bytes(request).unwrap();
        assert_eq!(conn.http_keep_alive_remaining(), Some(0));

        let next = b"GET /second HTTP/1.1\r\nHost: example.com\r\n\r\n";
        conn.handle_http1_pipelined_bytes(next).unwrap();
        assert_eq!(conn.http_keep_alive_remaining(), None);
    }
}
