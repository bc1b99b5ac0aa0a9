//! # Envelope Signer
//!
//! Produces `AuthContext` values the engine's auth verifier accepts:
//! hashes the canonical body, draws a fresh nonce and signs the signing
//! input for the signer's identity.

use crate::ecdsa::{P256KeyPair, Secp256k1KeyPair};
use crate::signatures::Ed25519KeyPair;
use crate::CryptoError;
use chrono::{DateTime, Utc};
use pap_types::{
    payload_digest, signing_input, AgentIdentity, AuthContext, Envelope, MessageBody,
    SignatureAlgorithm,
};
use uuid::Uuid;

/// Secret key for one of the supported algorithms.
pub enum SigningKeyPair {
    Ed25519(Ed25519KeyPair),
    P256(P256KeyPair),
    Secp256k1(Secp256k1KeyPair),
}

impl SigningKeyPair {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            SigningKeyPair::Ed25519(_) => SignatureAlgorithm::Ed25519,
            SigningKeyPair::P256(_) => SignatureAlgorithm::EcdsaP256,
            SigningKeyPair::Secp256k1(_) => SignatureAlgorithm::EcdsaSecp256k1,
        }
    }

    /// Raw public key bytes as a key registry stores them.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            SigningKeyPair::Ed25519(kp) => kp.public_key().as_bytes().to_vec(),
            SigningKeyPair::P256(kp) => kp.public_key().to_sec1(),
            SigningKeyPair::Secp256k1(kp) => kp.public_key().to_sec1(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningKeyPair::Ed25519(kp) => kp.sign(message).to_vec(),
            SigningKeyPair::P256(kp) => kp.sign(message),
            SigningKeyPair::Secp256k1(kp) => kp.sign(message),
        }
    }
}

/// Signs envelopes on behalf of one agent identity.
pub struct EnvelopeSigner {
    identity: AgentIdentity,
    key: SigningKeyPair,
}

impl EnvelopeSigner {
    pub fn new(identity: AgentIdentity, key: SigningKeyPair) -> Self {
        Self { identity, key }
    }

    /// Signer with a fresh random Ed25519 key.
    pub fn ed25519(identity: AgentIdentity) -> Self {
        Self::new(identity, SigningKeyPair::Ed25519(Ed25519KeyPair::generate()))
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.key.public_key_bytes()
    }

    /// Build the auth context for `body` with an explicit nonce and time.
    pub fn auth_for(
        &self,
        body: &MessageBody,
        nonce: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Result<AuthContext, CryptoError> {
        let digest = payload_digest(body).map_err(|e| CryptoError::SigningFailed(e.message))?;
        let mut auth = AuthContext {
            signature: Vec::new(),
            algorithm: self.key.algorithm(),
            payload_hash: digest.to_vec(),
            nonce: nonce.into(),
            issued_at,
        };
        auth.signature = self.key.sign(&signing_input(&self.identity, &auth));
        Ok(auth)
    }

    /// Sign `body` into a new envelope issued at `issued_at`.
    pub fn sign_at(
        &self,
        body: MessageBody,
        issued_at: DateTime<Utc>,
    ) -> Result<Envelope, CryptoError> {
        let auth = self.auth_for(&body, Uuid::new_v4().to_string(), issued_at)?;
        Ok(Envelope::new(self.identity.clone(), auth, body).with_sent_at(issued_at))
    }

    /// Sign `body` into a new envelope issued now.
    pub fn sign(&self, body: MessageBody) -> Result<Envelope, CryptoError> {
        self.sign_at(body, Utc::now())
    }
}
