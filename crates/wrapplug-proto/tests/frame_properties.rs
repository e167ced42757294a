//! Property-based tests for frame and payload decoding.
//!
//! Decoding must never panic on arbitrary input, and any frame that decodes
//! must re-encode to the bytes it came from.

use bytes::Bytes;
use proptest::prelude::*;
use wrapplug_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{
        hmac::ComputeHmacRequest,
        wrapping::{WrapOptions, WrapRequest},
    },
};

fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop::sample::select(Opcode::ALL.to_vec())
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_opcode(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(opcode, request_id, payload)| {
            let mut header = FrameHeader::new(opcode);
            header.set_request_id(request_id);
            Frame::new(header, Bytes::from(payload))
        },
    )
}

proptest! {
    #[test]
    fn prop_frame_encode_decode_roundtrip(frame in arbitrary_frame()) {
        let mut buf = Vec::new();
        frame.encode(&mut buf).expect("encode should succeed");

        let decoded = Frame::decode(&buf).expect("decode should succeed");

        prop_assert_eq!(decoded.header, frame.header);
        prop_assert_eq!(decoded.payload, frame.payload);
    }

    #[test]
    fn prop_decode_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        if let Ok(frame) = Frame::decode(&bytes) {
            let _ = Payload::from_frame(&frame);
        }
    }

    #[test]
    fn prop_payload_garbage_never_panics(
        opcode in arbitrary_opcode(),
        bytes in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let _ = Payload::decode(opcode, &bytes);
    }

    #[test]
    fn prop_wrap_request_preserves_plaintext(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        timeout_ms in proptest::option::of(any::<u64>()),
    ) {
        let payload = Payload::Wrap(WrapRequest {
            plaintext: plaintext.clone(),
            options: WrapOptions::default(),
            timeout_ms,
        });
        let frame = payload.into_frame(9).expect("encode");

        let Payload::Wrap(decoded) = Payload::from_frame(&frame).expect("decode") else {
            return Err(TestCaseError::fail("wrong payload variant"));
        };
        prop_assert_eq!(decoded.plaintext, plaintext);
        prop_assert_eq!(decoded.timeout_ms, timeout_ms);
    }
}

#[test]
fn frame_opcode_selects_payload_type() {
    let request = Payload::ComputeHmac(ComputeHmacRequest { data: vec![1, 2, 3], timeout_ms: None });
    let frame = request.into_frame(1).unwrap();

    // Same bytes under a different opcode must not silently decode as the
    // original request.
    let mut wrong = frame.clone();
    wrong.header = FrameHeader::new(Opcode::Hello);
    wrong = Frame::new(wrong.header, wrong.payload);

    assert!(Payload::from_frame(&wrong).is_err());
    assert_eq!(Payload::from_frame(&frame).unwrap().opcode(), Opcode::ComputeHmac);
}
