//! Fuzz target for wire decoding and structural checks.
//!
//! ## Running
//!
//! ```bash
//! cd crates/pap-engine
//! cargo +nightly fuzz run fuzz_decode_envelope
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use pap_engine::check_structure;
use pap_types::{decode_envelope, encode_envelope, payload_digest};

fuzz_target!(|data: &[u8]| {
    // Must never panic, whatever the bytes
    let Ok(envelope) = decode_envelope(data) else {
        return;
    };

    let _ = check_structure(&envelope);

    // A decoded envelope re-encodes and decodes to the same body digest
    if let Ok(bytes) = encode_envelope(&envelope) {
        let again = decode_envelope(&bytes).expect("re-encoded envelope must decode");
        assert_eq!(
            payload_digest(&envelope.body).ok(),
            payload_digest(&again.body).ok()
        );
    }
});
