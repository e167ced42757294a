//! Fuzz target for Payload::from_frame
//!
//! Feeds the same bytes as the CBOR body of every opcode, covering malformed
//! CBOR and payloads sent under the wrong opcode. Must never panic.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use wrapplug_proto::{Frame, FrameHeader, Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    for opcode in Opcode::ALL {
        let mut header = FrameHeader::new(opcode);
        header.set_request_id(1);

        let frame = Frame::new(header, Bytes::copy_from_slice(data));
        let _ = Payload::from_frame(&frame);
    }
});
