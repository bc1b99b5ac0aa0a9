//! # Auth Verifier
//!
//! Authenticates an envelope in a fixed order:
//!
//! 1. algorithm enabled (`VERSION_UNSUPPORTED`)
//! 2. `payloadHash` equals the body digest (`BAD_REQUEST`)
//! 3. sender key registered, signature valid (`UNAUTHORIZED`)
//! 4. `issuedAt` inside the skew window (`TIMEOUT` stale, `BAD_REQUEST` future)
//! 5. nonce not seen before (`CONFLICT`)
//!
//! The nonce is only recorded once every earlier check has passed, so a
//! forged or stale envelope cannot burn a legitimate sender's nonce.

use chrono::{DateTime, Utc};
use pap_crypto::verify_signature;
use pap_telemetry::{metric_inc, time_histogram, SIGNATURE_VERIFICATIONS, VERIFICATION_DURATION};
use pap_types::{payload_digest, signing_input, Envelope, SignatureAlgorithm};
use std::sync::Arc;
use tracing::{debug, warn};

use super::config::{delta, EngineConfig};
use super::errors::AuthError;
use super::replay::ReplayGuard;
use crate::ports::outbound::KeyRegistry;

/// Proof that an envelope passed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub algorithm: SignatureAlgorithm,
    pub issued_at: DateTime<Utc>,
}

pub struct AuthVerifier {
    config: EngineConfig,
    keys: Arc<dyn KeyRegistry>,
    replay: Arc<ReplayGuard>,
}

impl AuthVerifier {
    pub fn new(config: EngineConfig, keys: Arc<dyn KeyRegistry>, replay: Arc<ReplayGuard>) -> Self {
        Self {
            config,
            keys,
            replay,
        }
    }

    pub fn verify(&self, envelope: &Envelope, now: DateTime<Utc>) -> Result<Verified, AuthError> {
        let _timer = time_histogram!(VERIFICATION_DURATION);
        let auth = &envelope.auth;

        if !self.config.supports(&auth.algorithm) {
            return Err(AuthError::UnsupportedAlgorithm(
                auth.algorithm.as_str().to_string(),
            ));
        }

        let digest = payload_digest(&envelope.body).map_err(|_| AuthError::PayloadHashMismatch)?;
        if auth.payload_hash.as_slice() != digest.as_slice() {
            return Err(AuthError::PayloadHashMismatch);
        }

        self.check_signature(envelope)?;
        self.check_freshness(auth.issued_at, now)?;

        if !self
            .replay
            .check_and_record(&envelope.sender.agent, &auth.nonce, auth.issued_at, now)
        {
            return Err(AuthError::Replay {
                agent: envelope.sender.agent.clone(),
            });
        }

        debug!(sender = %envelope.sender, algorithm = %auth.algorithm.as_str(), "Envelope authenticated");
        Ok(Verified {
            algorithm: auth.algorithm.clone(),
            issued_at: auth.issued_at,
        })
    }

    fn check_signature(&self, envelope: &Envelope) -> Result<(), AuthError> {
        let auth = &envelope.auth;
        let key = self
            .keys
            .lookup(&envelope.sender)
            .ok_or_else(|| AuthError::UnknownSender(envelope.sender.to_string()))?;

        if key.algorithm != auth.algorithm {
            return Err(AuthError::AlgorithmMismatch {
                registered: key.algorithm.as_str().to_string(),
                presented: auth.algorithm.as_str().to_string(),
            });
        }

        let message = signing_input(&envelope.sender, auth);
        let result = verify_signature(&auth.algorithm, &key.public_key, &message, &auth.signature);
        let outcome = if result.is_ok() { "valid" } else { "invalid" };
        metric_inc!(SIGNATURE_VERIFICATIONS, &[auth.algorithm.as_str(), outcome]);

        result.map_err(|e| {
            warn!(sender = %envelope.sender, error = %e, "Signature rejected");
            AuthError::BadSignature(e)
        })
    }

    fn check_freshness(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AuthError> {
        let skew = delta(self.config.max_clock_skew);
        let age = now - issued_at;
        if age > skew {
            return Err(AuthError::Stale {
                age_secs: age.num_seconds(),
            });
        }
        if -age > skew {
            return Err(AuthError::FromFuture {
                ahead_secs: (-age).num_seconds(),
            });
        }
        Ok(())
    }
}
