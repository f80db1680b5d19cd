//! Fuzz target for line tokenizing and the line codec.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use slirc_client::{LineCodec, ParsedLine};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic
    let mut codec = LineCodec::with_max_len(512);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(line)) = codec.decode(&mut buf) {
        let _ = ParsedLine::parse(&line);
    }

    if let Ok(input) = std::str::from_utf8(data) {
        let sanitized = LineCodec::sanitize(input);
        assert!(!sanitized.contains(['\r', '\n']));
    }
});
