//! # Outbound Ports (Driven Ports / SPI)
//!
//! Collaborators the engine depends on but does not own: a clock, the
//! public-key registry, the agent directory and the directive delivery
//! channel. How they are populated is outside the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pap_bus::ReleasedDirective;
use pap_types::{AgentIdentity, PapError, SignatureAlgorithm, Target};
use std::collections::BTreeSet;

// =============================================================================
// CLOCK
// =============================================================================

/// Injectable time source.
///
/// Every skew, deadline and expiry comparison in the engine reads this.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// =============================================================================
// KEY REGISTRY
// =============================================================================

/// Public key material registered for an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredKey {
    pub algorithm: SignatureAlgorithm,
    /// Raw key bytes: 32 bytes for Ed25519, SEC1 for ECDSA.
    pub public_key: Vec<u8>,
}

/// Lookup of the key an agent signs with.
pub trait KeyRegistry: Send + Sync {
    /// Key registered for `identity`, if any.
    fn lookup(&self, identity: &AgentIdentity) -> Option<RegisteredKey>;
}

// =============================================================================
// AGENT DIRECTORY
// =============================================================================

/// Where a resolved invoke goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub agent: String,
    pub namespace: Option<String>,
    /// Transport address, opaque to the engine.
    pub address: String,
}

/// Health as reported by the destination itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AgentHealth {
    #[default]
    Healthy,
    Unhealthy { reason: String },
    Busy,
}

/// A directory record for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub destination: Destination,
    /// Capabilities the agent offers.
    pub capabilities: BTreeSet<String>,
    pub health: AgentHealth,
}

/// Resolves targets to destinations.
pub trait AgentDirectory: Send + Sync {
    /// Entry for the target's `(agent, namespace)`, if known.
    fn lookup(&self, target: &Target) -> Option<DirectoryEntry>;
}

// =============================================================================
// DIRECTIVE DELIVERY
// =============================================================================

/// Hands released control directives to the target agent.
///
/// The target applies the effect; the engine only decides when.
///
/// `deliver` runs inline on the envelope path and on release timers, so it
/// must return without waiting on the target agent. Implementations enqueue
/// the directive for a transport task (see `ChannelDelivery`) and report a
/// full or closed queue as an error.
#[async_trait]
pub trait DirectiveDelivery: Send + Sync {
    async fn deliver(&self, directive: ReleasedDirective) -> Result<(), PapError>;
}
