//! In-memory public key registry.

use pap_crypto::EnvelopeSigner;
use pap_types::{AgentIdentity, SignatureAlgorithm};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::ports::outbound::{KeyRegistry, RegisteredKey};

/// Keys by `(agent, cluster)`.
#[derive(Debug, Default)]
pub struct InMemoryKeyRegistry {
    keys: RwLock<HashMap<(String, String), RegisteredKey>>,
}

impl InMemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        identity: &AgentIdentity,
        algorithm: SignatureAlgorithm,
        public_key: Vec<u8>,
    ) {
        debug!(
            agent = %identity,
            algorithm = %algorithm,
            key_prefix = %hex::encode(&public_key[..public_key.len().min(8)]),
            "Key registered"
        );
        self.keys.write().insert(
            (identity.agent.clone(), identity.cluster.clone()),
            RegisteredKey {
                algorithm,
                public_key,
            },
        );
    }

    /// Register the public half of a signer under its own identity.
    pub fn register_signer(&self, signer: &EnvelopeSigner) {
        self.register(signer.identity(), signer.algorithm(), signer.public_key_bytes());
    }

    pub fn revoke(&self, identity: &AgentIdentity) -> bool {
        self.keys
            .write()
            .remove(&(identity.agent.clone(), identity.cluster.clone()))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

impl KeyRegistry for InMemoryKeyRegistry {
    fn lookup(&self, identity: &AgentIdentity) -> Option<RegisteredKey> {
        self.keys
            .read()
            .get(&(identity.agent.clone(), identity.cluster.clone()))
            .cloned()
    }
}
