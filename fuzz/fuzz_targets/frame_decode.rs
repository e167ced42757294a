//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes must either decode or return an error: no panics, no
//! over-reads past the declared payload size, no oversized allocations.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wrapplug_proto::{Frame, FrameHeader};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        assert!(frame.payload.len() <= FrameHeader::MAX_PAYLOAD_SIZE as usize);
        assert_eq!(frame.encoded_len(), FrameHeader::SIZE + frame.payload.len());
    }
});
