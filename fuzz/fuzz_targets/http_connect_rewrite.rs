//! The plain-HTTP request-line rewrite and absolute-URI authority
//! extraction run on attacker-controlled request lines before any
//! destination is dialed; neither should panic on malformed UTF-8 or
//! missing tokens.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_proto::http::{host_port_from_absolute_uri, rewrite_request_line_to_abs_path};

fuzz_target!(|data: &str| {
    let _ = rewrite_request_line_to_abs_path(data);
    let _ = host_port_from_absolute_uri(data);
});
