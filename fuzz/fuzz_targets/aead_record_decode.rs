//! `Decoder::decode` must never panic on arbitrary ciphertext, including
//! truncated salts, truncated length cells, and length cells claiming a
//! record longer than what follows.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_core::aead_codec::Decoder;
use relay_crypto::MasterKey;
use relay_proto::CipherKind;

fuzz_target!(|data: &[u8]| {
    let master_key = MasterKey::from_passphrase("fuzz-corpus-key", CipherKind::Chacha20Poly1305);
    let mut decoder = Decoder::new(CipherKind::Chacha20Poly1305, master_key);
    // Feed in two chunks to exercise the "wait for more bytes" partial-read
    // path as well as a single-shot decode.
    let midpoint = data.len() / 2;
    let _ = decoder.decode(&data[..midpoint]);
    let _ = decoder.decode(&data[midpoint..]);
});
