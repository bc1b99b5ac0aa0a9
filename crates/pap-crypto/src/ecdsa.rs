//! # ECDSA Signatures
//!
//! `"ecdsa-p256"` (NIST P-256) and `"ecdsa-secp256k1"` over SHA-256.
//!
//! ## Encodings
//!
//! - Public keys: SEC1, compressed (33 bytes) or uncompressed (65 bytes).
//! - Signatures: fixed `r || s` (64 bytes); ASN.1 DER is accepted on verify.
//! - Signing is RFC 6979 deterministic and emits the fixed form.

use crate::CryptoError;
use zeroize::Zeroize;

// =============================================================================
// P-256
// =============================================================================

/// SEC1-encoded P-256 public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct P256PublicKey(p256::ecdsa::VerifyingKey);

impl P256PublicKey {
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, CryptoError> {
        p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed SEC1 bytes.
    pub fn to_sec1(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        use p256::ecdsa::signature::Verifier;

        let sig = p256::ecdsa::Signature::from_slice(signature)
            .or_else(|_| p256::ecdsa::Signature::from_der(signature))
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;

        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// P-256 ECDSA keypair.
pub struct P256KeyPair {
    signing_key: p256::ecdsa::SigningKey,
}

impl P256KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: p256::ecdsa::SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret scalar bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key = p256::ecdsa::SigningKey::from_bytes((&bytes).into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> P256PublicKey {
        P256PublicKey(self.signing_key.verifying_key().clone())
    }

    /// Sign a message (deterministic RFC 6979), fixed 64-byte encoding.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use p256::ecdsa::signature::Signer;

        let sig: p256::ecdsa::Signature = self.signing_key.sign(message);
        sig.to_bytes().to_vec()
    }
}

impl Drop for P256KeyPair {
    fn drop(&mut self) {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

// =============================================================================
// secp256k1
// =============================================================================

/// SEC1-encoded secp256k1 public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secp256k1PublicKey(k256::ecdsa::VerifyingKey);

impl Secp256k1PublicKey {
    pub fn from_sec1(bytes: &[u8]) -> Result<Self, CryptoError> {
        k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed SEC1 bytes.
    pub fn to_sec1(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Verify a signature. High-S signatures are rejected.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        use k256::ecdsa::signature::Verifier;

        let sig = k256::ecdsa::Signature::from_slice(signature)
            .or_else(|_| k256::ecdsa::Signature::from_der(signature))
            .map_err(|_| CryptoError::InvalidSignatureFormat)?;

        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// secp256k1 ECDSA keypair.
pub struct Secp256k1KeyPair {
    signing_key: k256::ecdsa::SigningKey,
}

impl Secp256k1KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: k256::ecdsa::SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key = k256::ecdsa::SigningKey::from_bytes((&bytes).into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> Secp256k1PublicKey {
        Secp256k1PublicKey(self.signing_key.verifying_key().clone())
    }

    /// Sign a message (deterministic RFC 6979, low-S), fixed 64-byte encoding.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        use k256::ecdsa::signature::Signer;

        let sig: k256::ecdsa::Signature = self.signing_key.sign(message);
        sig.to_bytes().to_vec()
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}
