//! # Canonical Serialization
//!
//! Deterministic byte forms used for hashing and signing.
//!
//! ## Body bytes
//!
//! Compact JSON of the typed body. Struct fields serialize in declaration
//! order, all maps are `BTreeMap`s and absent optionals are skipped, so two
//! equal bodies always produce identical bytes.
//!
//! ## Signing input
//!
//! ```text
//! "PAP-v1" || lp(payloadHash) || lp(nonce) || lp(issuedAt)
//!          || lp(agent) || lp(cluster) || lp(version) || lp(instance)
//! ```
//!
//! where `lp(x)` is `u32_be(len(x)) || x`. The length prefixes keep
//! adjacent fields from being shifted into each other.
//!
//! `issuedAt` is signed as RFC 3339 UTC with all nine fractional digits,
//! so every instant the wire can carry has exactly one signed form.

use crate::envelope::{AgentIdentity, AuthContext, MessageBody};
use crate::errors::PapError;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Domain separation tag prepended to every signing input.
pub const SIGNING_DOMAIN: &[u8] = b"PAP-v1";

/// Length of a SHA-256 payload hash.
pub const PAYLOAD_HASH_LEN: usize = 32;

/// Canonical byte form of a message body.
pub fn canonical_body_bytes(body: &MessageBody) -> Result<Vec<u8>, PapError> {
    serde_json::to_vec(body)
        .map_err(|e| PapError::internal(format!("body serialization failed: {e}")))
}

/// SHA-256 over the canonical body bytes.
pub fn payload_digest(body: &MessageBody) -> Result<[u8; PAYLOAD_HASH_LEN], PapError> {
    let bytes = canonical_body_bytes(body)?;
    Ok(Sha256::digest(&bytes).into())
}

/// Bytes covered by the sender's signature.
#[must_use]
pub fn signing_input(sender: &AgentIdentity, auth: &AuthContext) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        SIGNING_DOMAIN.len() + 7 * 4 + auth.payload_hash.len() + auth.nonce.len() + 8 + 64,
    );
    out.extend_from_slice(SIGNING_DOMAIN);
    push_field(&mut out, &auth.payload_hash);
    push_field(&mut out, auth.nonce.as_bytes());
    push_field(&mut out, signed_timestamp(&auth.issued_at).as_bytes());
    push_field(&mut out, sender.agent.as_bytes());
    push_field(&mut out, sender.cluster.as_bytes());
    push_field(&mut out, sender.version.as_deref().unwrap_or("").as_bytes());
    push_field(&mut out, sender.instance.as_deref().unwrap_or("").as_bytes());
    out
}

/// Exact text form of a timestamp as it is signed.
#[must_use]
pub fn signed_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn push_field(out: &mut Vec<u8>, field: &[u8]) {
    // Fields are bounded by envelope size; truncation cannot occur in practice.
    let len = u32::try_from(field.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(field);
}
