//! Fuzz target for signature verification against adversarial keys and
//! signatures.
//!
//! ## Running
//!
//! ```bash
//! cd crates/pap-engine
//! cargo +nightly fuzz run fuzz_verify_signature
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use pap_crypto::verify_signature;
use pap_types::SignatureAlgorithm;

#[derive(Debug, arbitrary::Arbitrary)]
struct FuzzInput {
    algorithm: u8,
    public_key: Vec<u8>,
    message: Vec<u8>,
    signature: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let algorithm = match input.algorithm % 4 {
        0 => SignatureAlgorithm::Ed25519,
        1 => SignatureAlgorithm::EcdsaP256,
        2 => SignatureAlgorithm::EcdsaSecp256k1,
        _ => SignatureAlgorithm::Other("rsa-pss".into()),
    };

    let first = verify_signature(&algorithm, &input.public_key, &input.message, &input.signature);
    let second = verify_signature(&algorithm, &input.public_key, &input.message, &input.signature);

    // Deterministic
    assert_eq!(first.is_ok(), second.is_ok());

    // Unknown algorithms never verify
    if matches!(algorithm, SignatureAlgorithm::Other(_)) {
        assert!(first.is_err());
    }
});
