//! Decode arbitrary bytes as a stream of frames.
//!
//! Decoding must never panic, and every decoded frame must re-encode to the
//! exact bytes it was decoded from.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tether_harness::Frame;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    loop {
        let before = buf.clone();
        match Frame::decode(&mut buf) {
            Ok(Some(frame)) => {
                let consumed = before.len() - buf.len();
                let mut encoded = BytesMut::new();
                frame.encode(&mut encoded).expect("decoded frame re-encodes");
                assert_eq!(&encoded[..], &before[..consumed]);
            },
            Ok(None) | Err(_) => break,
        }
    }
});
