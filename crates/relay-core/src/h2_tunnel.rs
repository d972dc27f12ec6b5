//! HTTP/2 tunnel glue: header construction, hygiene, and settings for the
//! single-CONNECT-stream-per-connection transport.
//!
//! The actual frame codec, flow-control windows, and stream lifecycle are
//! the `h2` crate's job, an external collaborator; this module supplies the
//! pieces the state machines actually need to decide: how to build the
//! CONNECT request/response, how to negotiate padding, and how to enforce
//! the authority/host agreement and header hygiene rules. Back-pressure (the
//! "blocked stream" condition) maps directly onto
//! `h2::SendStream::capacity`/`poll_capacity`: a stream with zero available
//! capacity *is* the blocked-stream condition, so the pump checks
//! `send_stream.capacity() == 0` rather than tracking a separate flag.

use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, Uri};
use rand::RngCore;

use crate::error::{RelayError, Result};

/// Minimum HTTP/2 stream flow-control window granted at connection start.
pub const H2_STREAM_WINDOW_SIZE: u32 = 64 * 1024;

/// HPACK dynamic table size advertised in the initial SETTINGS frame. A
/// single-stream tunnel reuses very few header names, so a small table is
/// enough and keeps per-connection memory bounded.
pub const H2_HEADER_TABLE_SIZE: u32 = 4 * 1024;

/// `HEADER_TABLE_SIZE`/`MAX_CONCURRENT_STREAMS`/etc sent in the initial
/// SETTINGS frame. `ENABLE_PUSH` is always disabled: this transport never
/// pushes.
pub fn configure_server(builder: &mut h2::server::Builder) {
    builder
        .header_table_size(H2_HEADER_TABLE_SIZE)
        .initial_window_size(H2_STREAM_WINDOW_SIZE)
        .max_concurrent_streams(1)
        .max_header_list_size(16 * 1024);
}

/// Equivalent client-side settings.
pub fn configure_client(builder: &mut h2::client::Builder) {
    builder
        .header_table_size(H2_HEADER_TABLE_SIZE)
        .initial_window_size(H2_STREAM_WINDOW_SIZE)
        .max_concurrent_streams(1)
        .max_header_list_size(16 * 1024)
        .enable_push(false);
}

/// Random padding-advertisement value: the presence of the header, not
/// its content, is what the peer echoes back to confirm support.
fn random_padding_value() -> HeaderValue {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();
    // A lowercase hex string contains no bytes HeaderValue rejects.
    #[allow(clippy::expect_used)]
    HeaderValue::from_str(&encoded).expect("hex string is always a valid header value")
}

/// Build the client-side CONNECT request for `authority` (`host:port`),
/// with optional basic proxy credentials and optional padding
/// advertisement.
pub fn build_connect_request(
    authority: &str,
    credentials: Option<(&str, &str)>,
    padding_support: bool,
) -> Result<Request<()>> {
    let uri: Uri = authority.parse().map_err(|_| RelayError::InvalidArgument)?;

    let mut builder = Request::builder()
        .method("CONNECT")
        .uri(uri)
        .header("host", authority);

    if let Some((user, pass)) = credentials {
        let value = relay_proto::http::encode_basic_auth(user, pass);
        builder = builder.header("proxy-authorization", value);
    }
    if padding_support {
        builder = builder.header("padding", random_padding_value());
    }

    builder.body(()).map_err(|e| RelayError::Protocol(e.to_string()))
}

/// Build the server-side 200 response to a successful CONNECT, echoing
/// padding support only if the request advertised it.
pub fn build_connect_response(peer_advertised_padding: bool) -> Result<Response<()>> {
    let mut builder = Response::builder().status(200).header("server", "relay");
    if peer_advertised_padding {
        builder = builder.header("padding", random_padding_value());
    }
    builder.body(()).map_err(|e| RelayError::Protocol(e.to_string()))
}

/// `Connection`-family headers that must never be forwarded over HTTP/2
/// (h2 forbids them outright; we also drop them before submission so a
/// misbehaving peer's extra headers don't leak through).
fn is_connection_family_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection" | "keep-alive" | "proxy-connection" | "transfer-encoding" | "upgrade"
    )
}

/// Strip any `Connection`-family header before submitting `headers`.
pub fn strip_connection_headers(headers: &mut HeaderMap) {
    let drop_names: Vec<HeaderName> =
        headers.keys().filter(|name| is_connection_family_header(name)).cloned().collect();
    for name in drop_names {
        headers.remove(name);
    }
}

/// Validate that an explicit `Authority` pseudo-header and a `Host`
/// header, when both present, agree case-insensitively. A mismatch is a
/// fatal protocol error.
pub fn authority_matches_host(authority: &str, host: Option<&str>) -> bool {
    match host {
        Some(host) => authority.eq_ignore_ascii_case(host),
        None => true,
    }
}

/// Whether a request advertised padding support via the `padding` header.
pub fn request_advertises_padding(headers: &HeaderMap) -> bool {
    headers.contains_key("padding")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_has_method_and_authority() {
        let req = build_connect_request("example.com:443", None, false).unwrap();
        assert_eq!(req.method(), "CONNECT");
        assert_eq!(req.uri().to_string(), "example.com:443");
        assert!(!req.headers().contains_key("padding"));
    }

    #[test]
    fn connect_request_with_credentials_sets_proxy_authorization() {
        let req = build_connect_request("example.com:443", Some(("alice", "hunter2")), true).unwrap();
        assert!(req.headers().contains_key("proxy-authorization"));
        assert!(req.headers().contains_key("padding"));
    }

    #[test]
    fn response_echoes_padding_only_if_peer_advertised_it() {
        let with_padding = build_connect_response(true).unwrap();
        assert!(with_padding.headers().contains_key("padding"));

        let without_padding = build_connect_response(false).unwrap();
        assert!(!without_padding.headers().contains_key("padding"));
    }

    #[test]
    fn strip_connection_headers_removes_hop_by_hop_names() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("proxy-connection", HeaderValue::from_static("close"));
        headers.insert("host", HeaderValue::from_static("example.com"));
        strip_connection_headers(&mut headers);
        assert!(!headers.contains_key("connection"));
        assert!(!headers.contains_key("proxy-connection"));
        assert!(headers.contains_key("host"));
    }

    #[test]
    fn authority_host_mismatch_is_detected() {
        assert!(authority_matches_host("example.com:443", Some("example.com:443")));
        assert!(authority_matches_host("Example.com:443", Some("example.com:443")));
        assert!(!authority_matches_host("example.com:443", Some("evil.com:443")));
        assert!(authority_matches_host("example.com:443", None));
    }
}
