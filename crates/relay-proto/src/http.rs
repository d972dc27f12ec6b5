//! Small HTTP/1.1 helpers.
//!
//! Full HTTP/1 *message* parsing (request line, header folding, chunked
//! transfer-encoding) is out of scope for this crate: that's an external
//! collaborator's job (e.g. `httparse`). What lives here are the few
//! header-level transformations the client and
//! server state machines need: building a CONNECT request/response,
//! stripping hop-by-hop headers, rewriting a request line to abs-path form,
//! and adding `Via`/`Forwarded`.

use base64::Engine;

/// Build a CONNECT request line + headers for the upstream HTTP/1.1 tunnel.
///
/// `credentials`, if set, is rendered as `Proxy-Authorization: basic
/// <b64(user:pass)>`.
pub fn build_connect_request(host_port: &str, credentials: Option<(&str, &str)>) -> String {
    let mut out = format!("CONNECT {host_port} HTTP/1.1\r\nHost: {host_port}\r\n");
    if let Some((user, pass)) = credentials {
        out.push_str("Proxy-Authorization: basic ");
        out.push_str(&encode_basic_auth(user, pass));
        out.push_str("\r\n");
    }
    out.push_str("Proxy-Connection: Close\r\n\r\n");
    out
}

/// The exact success response for a CONNECT tunnel.
pub const CONNECT_SUCCESS_RESPONSE: &str = "HTTP/1.1 200 Connection established\r\n\r\n";

/// Encode `user:pass` as base64 for a `basic` auth credential.
pub fn encode_basic_auth(user: &str, pass: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
}

/// Decode and validate a `basic` proxy-authorization value against expected
/// credentials. `header_value` is the value after the scheme, i.e. what
/// follows `Proxy-Authorization: basic `.
pub fn verify_basic_auth(header_value: &str, expected_user: &str, expected_pass: &str) -> bool {
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(header_value.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    decoded == format!("{expected_user}:{expected_pass}")
}

/// Is this header name one of the hop-by-hop headers that must never be
/// forwarded across the proxy boundary (RFC 7230 §6.1, plus the
/// proxy-specific `Proxy-Connection`)? `Connection` itself is always
/// stripped here too — whether the rewritten request carries its own
/// `Connection: keep-alive` is decided separately, by
/// [`inspect_keep_alive`], since the two directions don't necessarily
/// agree (chunked bodies force it off regardless of what the client sent).
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection" | "proxy-connection" | "keep-alive" | "te" | "trailer" | "transfer-encoding" | "upgrade"
    )
}

/// Header-level facts needed to decide whether a plain-HTTP
/// request/response can be followed by another pipelined request on the
/// same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveInfo {
    /// The client asked for `Connection`/`Proxy-Connection: keep-alive`
    /// and the body isn't chunked (chunked transfer always disables it,
    /// since re-framing the next request would require decoding chunks).
    pub keep_alive: bool,
    /// `Content-Length`, or 0 if absent.
    pub content_length: u64,
}

/// Inspect a parsed header list (one entry per line, `Name: value`, request
/// line already excluded) for keep-alive and body-framing intent.
pub fn inspect_keep_alive(headers: &[&str]) -> KeepAliveInfo {
    let mut content_length = 0u64;
    let mut chunked = false;
    let mut keep_alive = false;

    for line in headers {
        let Some((name, value)) = line.split_once(':') else { continue };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("transfer-encoding") && value.eq_ignore_ascii_case("chunked") {
            chunked = true;
        } else if (name.eq_ignore_ascii_case("connection") || name.eq_ignore_ascii_case("proxy-connection"))
            && value.eq_ignore_ascii_case("keep-alive")
        {
            keep_alive = true;
        }
    }

    KeepAliveInfo { keep_alive: keep_alive && !chunked, content_length }
}

/// Rewrite a request line from absolute-URI form
/// (`GET http://host/path HTTP/1.1`) to origin-form (`GET /path HTTP/1.1`),
/// as a plain-HTTP proxy must before forwarding to the origin. Returns the
/// line unchanged if it is already in origin-form.
pub fn rewrite_request_line_to_abs_path(line: &str) -> String {
    let mut parts = line.splitn(3, ' ');
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
        return line.to_string();
    };
    let Some(scheme_end) = target.find("://") else {
        return line.to_string();
    };
    let after_scheme = &target[scheme_end + 3..];
    let path = match after_scheme.find('/') {
        Some(idx) => &after_scheme[idx..],
        None => "/",
    };
    format!("{method} {path} {version}")
}

/// Extract `host:port` from a request-line absolute-URI target, if present.
pub fn host_port_from_absolute_uri(target: &str) -> Option<String> {
    let after_scheme = target.split_once("://")?.1;
    let authority = after_scheme.split('/').next().unwrap_or(after_scheme);
    if authority.is_empty() { None } else { Some(authority.to_string()) }
}

/// Build a `Via` header value, e.g. `1.1 relay`.
pub fn via_header_value(pseudonym: &str) -> String {
    format!("1.1 {pseudonym}")
}

/// Build a `Forwarded` header value for a peer address, e.g.
/// `for="1.2.3.4:5678"`.
pub fn forwarded_header_value(peer: &str) -> String {
    format!("for=\"{peer}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_without_auth() {
        let req = build_connect_request("example.com:443", None);
        assert!(req.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(!req.contains("Proxy-Authorization"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn connect_request_with_auth() {
        let req = build_connect_request("example.com:443", Some(("alice", "hunter2")));
        assert!(req.contains("Proxy-Authorization: basic "));
        let expected = encode_basic_auth("alice", "hunter2");
        assert!(req.contains(&expected));
    }

    #[test]
    fn basic_auth_roundtrip() {
        let encoded = encode_basic_auth("alice", "hunter2");
        assert!(verify_basic_auth(&encoded, "alice", "hunter2"));
        assert!(!verify_basic_auth(&encoded, "alice", "wrong"));
    }

    #[test]
    fn rewrites_absolute_uri_to_abs_path() {
        let line = rewrite_request_line_to_abs_path("GET http://example.com/foo?x=1 HTTP/1.1");
        assert_eq!(line, "GET /foo?x=1 HTTP/1.1");
    }

    #[test]
    fn rewrite_leaves_origin_form_alone() {
        let line = rewrite_request_line_to_abs_path("GET /foo HTTP/1.1");
        assert_eq!(line, "GET /foo HTTP/1.1");
    }

    #[test]
    fn rewrite_defaults_to_root_when_no_path() {
        let line = rewrite_request_line_to_abs_path("GET http://example.com HTTP/1.1");
        assert_eq!(line, "GET / HTTP/1.1");
    }

    #[test]
    fn extracts_authority_from_absolute_uri() {
        assert_eq!(
            host_port_from_absolute_uri("http://example.com:8080/foo"),
            Some("example.com:8080".to_string())
        );
        assert_eq!(host_port_from_absolute_uri("/foo"), None);
    }

    #[test]
    fn hop_by_hop_headers_recognized() {
        assert!(is_hop_by_hop_header("Proxy-Connection"));
        assert!(is_hop_by_hop_header("Connection"));
        assert!(!is_hop_by_hop_header("Host"));
    }

    #[test]
    fn keep_alive_detected_from_connection_or_proxy_connection() {
        let info = inspect_keep_alive(&["Host: example.com", "Connection: keep-alive", "Content-Length: 12"]);
        assert!(info.keep_alive);
        assert_eq!(info.content_length, 12);

        let info = inspect_keep_alive(&["Host: example.com", "Proxy-Connection: keep-alive"]);
        assert!(info.keep_alive);
    }

    #[test]
    fn chunked_transfer_disables_keep_alive_regardless_of_connection_header() {
        let info = inspect_keep_alive(&["Connection: keep-alive", "Transfer-Encoding: chunked"]);
        assert!(!info.keep_alive);
    }

    #[test]
    fn keep_alive_absent_by_default() {
        let info = inspect_keep_alive(&["Host: example.com"]);
        assert!(!info.keep_alive);
        assert_eq!(info.content_length, 0);
    }
}
