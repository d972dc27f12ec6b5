//! Client-side connection state machine: parses the client's chosen
//! protocol, replies, and decides the destination to dial.
//!
//! This module only does protocol detection and reply construction; the
//! actual HTTP/1 message grammar is an external collaborator, so the
//! plain-HTTP path here only extracts what the state machine itself needs
//! (request line, `Host` header, `Connection` family headers) rather than
//! re-implementing a general parser.
//!
//! Detection order: SOCKS5 method-select → SOCKS4/4a → HTTP.
//! (The redirect-mode probe is a platform hook outside this crate's
//! scope; callers that support transparent redirect skip straight to
//! [`ClientConnection::transparent_redirect`].)

use std::sync::Arc;

use relay_proto::{
    Destination,
    http::{self, CONNECT_SUCCESS_RESPONSE},
    socks4::{Socks4Reply, Socks4Request},
    socks5::{self, ConnectReply, ConnectRequest, MethodSelectRequest, Socks5Status},
};

use crate::{
    config::ProxyConfig,
    error::{RelayError, Result},
};

/// Where the client-side handler currently is in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No bytes consumed yet; auto-detecting the client's protocol.
    MethodSelect,
    /// SOCKS5 `USER_PASS` method chosen; waiting for the username/password
    /// sub-negotiation request.
    Socks5AwaitingUserPass,
    /// SOCKS5 method accepted; waiting for the CONNECT request.
    Socks5AwaitingRequest,
    /// Destination resolved; waiting for `connect_established`/
    /// `connect_failed` to finish the handshake.
    AwaitingUpstream,
    /// Handshake complete; bytes now flow as an opaque stream.
    Stream,
    /// Terminal.
    Closed,
}

/// Which client-facing protocol was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientProtocol {
    Socks4,
    Socks5,
    HttpConnect,
    HttpPlain,
}

/// Actions the driver must execute in response to a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send these bytes to the client socket.
    ReplyToClient(Vec<u8>),
    /// Dial this destination upstream.
    Dial(Destination),
    /// Forward these already-rewritten bytes to the upstream (used for
    /// the plain-HTTP path, where the first request line/headers must be
    /// rewritten before the first upstream write).
    ForwardToUpstream(Vec<u8>),
    /// Abort the connection.
    Close {
        /// Human-readable reason, for logging.
        reason: String,
    },
}

/// Sans-I/O client-side handler. The driver feeds it client bytes and
/// upstream-connect outcomes; it returns actions to execute.
pub struct ClientConnection {
    config: Arc<ProxyConfig>,
    state: ClientState,
    protocol: Option<ClientProtocol>,
    destination: Option<Destination>,
    /// Bytes still expected to complete the in-flight plain-HTTP
    /// request/response body while keep-alive tracking is active, `None`
    /// once it's disabled (chunked body, explicit close, or any
    /// non-plain-HTTP protocol). Can go negative when a read carries more
    /// than the remaining body, which is how the driver notices a
    /// pipelined request has started.
    http_keep_alive: Option<i64>,
}

impl ClientConnection {
    /// A fresh handler in [`ClientState::MethodSelect`].
    #[must_use]
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config, state: ClientState::MethodSelect, protocol: None, destination: None, http_keep_alive: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The destination resolved by the handshake, once known.
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Skip handshake parsing entirely for a transparently-redirected
    /// socket whose original destination the platform already supplied.
    pub fn transparent_redirect(&mut self, destination: Destination) -> Vec<ClientAction> {
        self.destination = Some(destination.clone());
        self.state = ClientState::AwaitingUpstream;
        vec![ClientAction::Dial(destination)]
    }

    /// Feed newly arrived client bytes and advance the handshake.
    ///
    /// # Errors
    ///
    /// `RelayError::InvalidArgument` when the input matches none of the
    /// supported protocols; `RelayError::Protocol` for a genuinely
    /// malformed request within a detected protocol.
    pub fn handle_client_bytes(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        match self.state {
            ClientState::MethodSelect => self.detect_and_handshake(input),
            ClientState::Socks5AwaitingUserPass => self.handle_socks5_user_pass(input),
            ClientState::Socks5AwaitingRequest => self.handle_socks5_connect_request(input),
            ClientState::AwaitingUpstream | ClientState::Stream | ClientState::Closed => {
                Err(RelayError::Protocol("unexpected client bytes for current state".into()))
            },
        }
    }

    fn detect_and_handshake(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        match input[0] {
            0x05 => self.handle_socks5_method_select(input),
            0x04 => self.handle_socks4(input),
            _ => self.handle_http(input),
        }
    }

    fn handle_socks5_method_select(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        let (request, _consumed) = MethodSelectRequest::parse(input)?;
        self.protocol = Some(ClientProtocol::Socks5);

        if self.config.requires_auth() {
            if !request.offers_user_pass() {
                self.state = ClientState::Closed;
                return Ok(vec![
                    ClientAction::ReplyToClient(socks5::encode_method_reply(socks5::method::NO_ACCEPTABLE).to_vec()),
                    ClientAction::Close { reason: "no acceptable SOCKS5 auth method".into() },
                ]);
            }
            self.state = ClientState::Socks5AwaitingUserPass;
            return Ok(vec![ClientAction::ReplyToClient(
                socks5::encode_method_reply(socks5::method::USER_PASS).to_vec(),
            )]);
        }

        if !request.offers_no_auth() {
            self.state = ClientState::Closed;
            return Ok(vec![
                ClientAction::ReplyToClient(socks5::encode_method_reply(socks5::method::NO_ACCEPTABLE).to_vec()),
                ClientAction::Close { reason: "no acceptable SOCKS5 auth method".into() },
            ]);
        }

        self.state = ClientState::Socks5AwaitingRequest;
        Ok(vec![ClientAction::ReplyToClient(
            socks5::encode_method_reply(socks5::method::NO_AUTH).to_vec(),
        )])
    }

    fn handle_socks5_user_pass(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        let (request, _consumed) = socks5::UserPassRequest::parse(input)?;
        let (expected_user, expected_pass) = (
            self.config.username.as_deref().unwrap_or_default(),
            self.config.password.as_deref().unwrap_or_default(),
        );
        let ok = request.username == expected_user.as_bytes() && request.password == expected_pass.as_bytes();
        if !ok {
            self.state = ClientState::Closed;
            return Ok(vec![
                ClientAction::ReplyToClient(socks5::encode_user_pass_reply(false).to_vec()),
                ClientAction::Close { reason: "SOCKS5 username/password rejected".into() },
            ]);
        }

        self.state = ClientState::Socks5AwaitingRequest;
        Ok(vec![ClientAction::ReplyToClient(socks5::encode_user_pass_reply(true).to_vec())])
    }

    fn handle_socks5_connect_request(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        let (request, _consumed) = ConnectRequest::parse(input)?;
        self.destination = Some(request.destination.clone());
        self.state = ClientState::AwaitingUpstream;
        Ok(vec![ClientAction::Dial(request.destination)])
    }

    fn handle_socks4(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        let (request, _consumed) = Socks4Request::parse(input)?;
        self.protocol = Some(ClientProtocol::Socks4);
        self.destination = Some(request.destination.clone());
        self.state = ClientState::AwaitingUpstream;
        Ok(vec![ClientAction::Dial(request.destination)])
    }

    fn handle_http(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        let text = std::str::from_utf8(input).map_err(|_| RelayError::InvalidArgument)?;
        let Some(header_end) = text.find("\r\n\r\n") else {
            return Ok(Vec::new()); // wait for the rest of the headers
        };
        let head = &text[..header_end];
        let trailing = &input[header_end + 4..];
        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(RelayError::InvalidArgument)?;
        let mut parts = request_line.split(' ');
        let method = parts.next().ok_or(RelayError::InvalidArgument)?;
        let target = parts.next().ok_or(RelayError::InvalidArgument)?;

        if !method.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RelayError::InvalidArgument);
        }

        if method.eq_ignore_ascii_case("CONNECT") {
            let destination = parse_host_port_destination(target)?;
            self.protocol = Some(ClientProtocol::HttpConnect);
            self.destination = Some(destination.clone());
            self.state = ClientState::AwaitingUpstream;
            self.http_keep_alive = None;
            let mut actions = vec![ClientAction::Dial(destination)];
            if !trailing.is_empty() {
                actions.push(ClientAction::ForwardToUpstream(trailing.to_vec()));
            }
            return Ok(actions);
        }

        let headers: Vec<&str> = lines.collect();
        let host_header = headers
            .iter()
            .find_map(|line| line.strip_prefix("Host:").or_else(|| line.strip_prefix("host:")))
            .map(str::trim);
        let host_port = if target.starts_with("http://") || target.starts_with("https://") {
            http::host_port_from_absolute_uri(target)
        } else {
            host_header.map(str::to_string)
        }
        .ok_or(RelayError::InvalidArgument)?;
        let destination = parse_host_port_destination(&host_port)?;

        self.protocol = Some(ClientProtocol::HttpPlain);
        self.destination = Some(destination.clone());
        self.state = ClientState::AwaitingUpstream;

        let keep_alive_info = http::inspect_keep_alive(&headers);
        self.http_keep_alive = if keep_alive_info.keep_alive {
            Some(keep_alive_info.content_length as i64 - trailing.len() as i64)
        } else {
            None
        };

        let mut rewritten = rewrite_plain_http_head(request_line, &headers, keep_alive_info.keep_alive, self.config.hide_via);
        rewritten.extend_from_slice(trailing);
        Ok(vec![ClientAction::Dial(destination), ClientAction::ForwardToUpstream(rewritten)])
    }

    /// Re-parse a pipelined plain-HTTP request arriving on an
    /// already-dialed keep-alive connection. Reuses the existing
    /// destination: carrying a new `Host` here would mean re-dialing,
    /// which this tunnel does not do once a stream is established.
    ///
    /// Falls back to raw passthrough (and disables keep-alive tracking) if
    /// the bytes don't parse as a fresh request header in one piece —
    /// fragmented pipelined headers aren't reassembled here, matching the
    /// same single-read assumption [`Self::handle_http`] makes for the
    /// first request.
    pub fn handle_http_pipelined_bytes(&mut self, input: &[u8]) -> Result<Vec<ClientAction>> {
        let parse_failed = |conn: &mut Self| {
            conn.http_keep_alive = None;
            Ok(vec![ClientAction::ForwardToUpstream(input.to_vec())])
        };

        let Ok(text) = std::str::from_utf8(input) else {
            return parse_failed(self);
        };
        let Some(header_end) = text.find("\r\n\r\n") else {
            return parse_failed(self);
        };
        let head = &text[..header_end];
        let trailing = &input[header_end + 4..];
        let mut lines = head.split("\r\n");
        let Some(request_line) = lines.next() else {
            return parse_failed(self);
        };
        let headers: Vec<&str> = lines.collect();

        let keep_alive_info = http::inspect_keep_alive(&headers);
        self.http_keep_alive = if keep_alive_info.keep_alive {
            Some(keep_alive_info.content_length as i64 - trailing.len() as i64)
        } else {
            None
        };

        let mut rewritten = rewrite_plain_http_head(request_line, &headers, keep_alive_info.keep_alive, self.config.hide_via);
        rewritten.extend_from_slice(trailing);
        Ok(vec![ClientAction::ForwardToUpstream(rewritten)])
    }

    /// Bytes remaining in the in-flight plain-HTTP request/response body
    /// while keep-alive tracking is active; `None` once it's been
    /// disabled.
    #[must_use]
    pub fn http_keep_alive_remaining(&self) -> Option<i64> {
        self.http_keep_alive
    }

    /// Record `n` bytes forwarded to the upstream while keep-alive
    /// tracking is active; a no-op otherwise.
    pub fn note_http_bytes_forwarded(&mut self, n: usize) {
        if let Some(remaining) = self.http_keep_alive.as_mut() {
            *remaining -= n as i64;
        }
    }

    /// The upstream connection (and, for tunnel transports, its handshake)
    /// completed; finish the client-visible handshake.
    pub fn connect_established(&mut self) -> Vec<ClientAction> {
        self.state = ClientState::Stream;
        match self.protocol {
            Some(ClientProtocol::Socks4) => {
                vec![ClientAction::ReplyToClient(Socks4Reply::granted().encode().to_vec())]
            },
            Some(ClientProtocol::Socks5) => {
                vec![ClientAction::ReplyToClient(ConnectReply::succeeded().encode())]
            },
            Some(ClientProtocol::HttpConnect) => {
                vec![ClientAction::ReplyToClient(CONNECT_SUCCESS_RESPONSE.as_bytes().to_vec())]
            },
            Some(ClientProtocol::HttpPlain) | None => Vec::new(),
        }
    }

    /// The upstream dial or handshake failed; produce the protocol's
    /// failure reply (when one hasn't already been sent) and close.
    pub fn connect_failed(&mut self, reason: &str) -> Vec<ClientAction> {
        self.state = ClientState::Closed;
        let mut actions = match self.protocol {
            Some(ClientProtocol::Socks4) => {
                vec![ClientAction::ReplyToClient(Socks4Reply::failed().encode().to_vec())]
            },
            Some(ClientProtocol::Socks5) => vec![ClientAction::ReplyToClient(
                ConnectReply::failed(Socks5Status::HostUnreachable).encode(),
            )],
            Some(ClientProtocol::HttpConnect | ClientProtocol::HttpPlain) | None => Vec::new(),
        };
        actions.push(ClientAction::Close { reason: reason.to_string() });
        actions
    }
}

fn parse_host_port_destination(host_port: &str) -> Result<Destination> {
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

fn rewrite_plain_http_head(request_line: &str, headers: &[&str], keep_alive: bool, hide_via: bool) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&http::rewrite_request_line_to_abs_path(request_line));
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
    if !hide_via {
        out.push_str(&http::via_header_value("relay"));
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.into_bytes()
}
