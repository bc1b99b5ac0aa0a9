//! Algorithm dispatch for signature verification.

use crate::ecdsa::{P256PublicKey, Secp256k1PublicKey};
use crate::signatures::Ed25519PublicKey;
use crate::CryptoError;
use pap_types::SignatureAlgorithm;

/// A decoded public key for one of the supported algorithms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(Ed25519PublicKey),
    P256(P256PublicKey),
    Secp256k1(Secp256k1PublicKey),
}

impl PublicKey {
    /// Decode raw key bytes for `algorithm`.
    pub fn decode(algorithm: &SignatureAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        match algorithm {
            SignatureAlgorithm::Ed25519 => Ed25519PublicKey::from_slice(bytes).map(Self::Ed25519),
            SignatureAlgorithm::EcdsaP256 => P256PublicKey::from_sec1(bytes).map(Self::P256),
            SignatureAlgorithm::EcdsaSecp256k1 => {
                Secp256k1PublicKey::from_sec1(bytes).map(Self::Secp256k1)
            }
            SignatureAlgorithm::Other(name) => Err(CryptoError::UnsupportedAlgorithm(name.clone())),
        }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PublicKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
            PublicKey::P256(_) => SignatureAlgorithm::EcdsaP256,
            PublicKey::Secp256k1(_) => SignatureAlgorithm::EcdsaSecp256k1,
        }
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match self {
            PublicKey::Ed25519(key) => key.verify(message, signature),
            PublicKey::P256(key) => key.verify(message, signature),
            PublicKey::Secp256k1(key) => key.verify(message, signature),
        }
    }
}

/// Verify `signature` over `message` with raw `public_key` bytes.
pub fn verify_signature(
    algorithm: &SignatureAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    PublicKey::decode(algorithm, public_key)?.verify(message, signature)
}
