//! # PAP Crypto
//!
//! Signature primitives behind envelope authentication.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Default envelope signatures |
//! | `ecdsa` | P-256, secp256k1 | ECDSA envelope signatures |
//! | `verify` | dispatch | Verify by `AuthContext.algorithm` |
//! | `signer` | all | Produce signed envelopes |
//!
//! ## Security Properties
//!
//! - **Ed25519**: deterministic nonces, strict verification
//! - **ECDSA**: RFC 6979 deterministic nonces, low-S enforced on secp256k1
//! - Secret key material is zeroized on drop

#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod signatures;
pub mod signer;
pub mod verify;

pub use ecdsa::{P256KeyPair, P256PublicKey, Secp256k1KeyPair, Secp256k1PublicKey};
pub use errors::CryptoError;
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey};
pub use signer::{EnvelopeSigner, SigningKeyPair};
pub use verify::{verify_signature, PublicKey};
