//! Fuzz target for the plugin handshake line parser
//!
//! The host parses whatever the plugin prints on stdout. Any accepted line
//! must print back to a line that parses to the same value.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wrapplug_core::HandshakeLine;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(line) = text.parse::<HandshakeLine>() {
        let reparsed: HandshakeLine = line.to_string().parse().unwrap();
        assert_eq!(reparsed, line);
    }
});
