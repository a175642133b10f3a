#![no_main]

use libfuzzer_sys::fuzz_target;
use quilt_core::core_canvas::sync::Frame;
use quilt_core::core_canvas::{Operation, PresenceMessage, VersionSummary};

fuzz_target!(|data: &[u8]| {
    // Peer bytes must never panic the decoder or the conversions behind it
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    match frame {
        Frame::Op(wire) => {
            if let Ok(op) = Operation::try_from(wire) {
                // A valid operation re-encodes to a stable byte form
                let bytes = Frame::op(&op).and_then(|f| f.encode()).expect("re-encode");
                let again = Frame::decode(&bytes).and_then(|f| f.encode()).expect("decode re-encoded");
                assert_eq!(bytes, again);
            }
        }
        Frame::VersionSummary(wire) => {
            let _ = VersionSummary::try_from(wire);
        }
        Frame::Presence(wire) => {
            let _ = PresenceMessage::try_from(wire);
        }
    }
});
