//! `Destination::parse` must never panic, over/under-read, or accept a
//! length-prefixed domain name whose claimed length exceeds what was
//! actually supplied.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relay_proto::Destination;

fuzz_target!(|data: &[u8]| {
    if let Ok((destination, consumed)) = Destination::parse(data) {
        assert!(consumed <= data.len());
        assert_eq!(consumed, destination.encoded_len());

        let mut reencoded = Vec::new();
        destination.encode(&mut reencoded);
        assert_eq!(reencoded, data[..consumed]);
    }
});
