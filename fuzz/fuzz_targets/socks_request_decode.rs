//! SOCKS4/4a and SOCKS5 request/method-select parsing must never panic on
//! arbitrary bytes, regardless of which dialect the input happens to look
//! like.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_proto::socks4::Socks4Request;
use relay_proto::socks5::{ConnectRequest, MethodSelectRequest, UserPassRequest};

fuzz_target!(|data: &[u8]| {
    let _ = Socks4Request::parse(data);
    let _ = MethodSelectRequest::parse(data);
    let _ = ConnectRequest::parse(data);
    let _ = UserPassRequest::parse(data);
});
