//! Crypto error types.

use pap_types::{ErrorCode, PapError};
use thiserror::Error;

/// Signature operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Algorithm name not implemented by this crate
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Public key bytes do not decode to a valid point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Secret key bytes out of range
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Signature bytes have the wrong length or encoding
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Signature does not verify under the given key
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Signing input could not be produced
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

impl From<CryptoError> for PapError {
    fn from(err: CryptoError) -> Self {
        let code = match err {
            CryptoError::UnsupportedAlgorithm(_) => ErrorCode::VersionUnsupported,
            CryptoError::SigningFailed(_) => ErrorCode::InternalError,
            CryptoError::InvalidPublicKey
            | CryptoError::InvalidPrivateKey
            | CryptoError::InvalidSignatureFormat
            | CryptoError::SignatureVerificationFailed => ErrorCode::Unauthorized,
        };
        PapError::new(code, err.to_string())
    }
}
