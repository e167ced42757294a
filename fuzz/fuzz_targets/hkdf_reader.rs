//! Fuzz target for the derived key reader
//!
//! Arbitrary key material, salt, info, limit and read sizes. The reader must
//! never yield more than the limit, never panic, and agree with a single
//! bulk read of the same stream.

#![no_main]

use std::io::Read;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use wrapplug_crypto::{HkdfReader, MAX_OUTPUT_LEN};

#[derive(Debug, Arbitrary)]
struct Input {
    ikm: Vec<u8>,
    salt: Option<Vec<u8>>,
    info: Vec<u8>,
    limit: u16,
    chunks: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let limit = u64::from(input.limit) % (MAX_OUTPUT_LEN as u64 + 1);
    let open = || HkdfReader::new(&input.ikm, input.salt.as_deref(), &input.info).take(limit);

    let mut bulk = Vec::new();
    let Ok(_) = open().read_to_end(&mut bulk) else {
        return;
    };
    assert_eq!(bulk.len() as u64, limit);

    let mut reader = open();
    let mut chunked = Vec::new();
    for size in input.chunks.iter().map(|&c| usize::from(c)) {
        let mut buf = vec![0u8; size];
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => chunked.extend_from_slice(&buf[..n]),
            Err(_) => return,
        }
    }
    assert_eq!(chunked, bulk[..chunked.len()]);
});
