//! # PAP Types Crate
//!
//! The Process Agent Protocol data model shared by every other crate:
//! the `Envelope` wrapper, the six message variants, the closed error
//! taxonomy, the wire form and the canonical byte forms used for signing.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every protocol type is defined here.
//! - **Closed Variants**: message kinds and error codes are exhaustive enums.
//! - **Absent Means Absent**: optional wire fields stay `Option` so defaults
//!   (`expectReply`, `isFinal`) are applied by accessors, not by decoding.

pub mod canonical;
pub mod envelope;
pub mod errors;
pub mod wire;

pub use canonical::{
    canonical_body_bytes, payload_digest, signed_timestamp, signing_input, SIGNING_DOMAIN,
};
pub use envelope::*;
pub use errors::{ErrorCategory, ErrorCode, PapError};
pub use wire::{decode_envelope, encode_envelope, WireEnvelope, WireError};
