//! In-memory agent directory.

use pap_types::Target;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

use crate::ports::outbound::{AgentDirectory, AgentHealth, Destination, DirectoryEntry};

type DirectoryKey = (String, Option<String>);

/// Entries by `(agent, namespace)`. A target without a namespace only
/// matches entries registered without one.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<DirectoryKey, DirectoryEntry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: DirectoryEntry) {
        let key = (
            entry.destination.agent.clone(),
            entry.destination.namespace.clone(),
        );
        self.entries.write().insert(key, entry);
    }

    /// Register a healthy agent offering `capabilities`.
    pub fn register_agent<I, S>(
        &self,
        agent: &str,
        namespace: Option<&str>,
        address: &str,
        capabilities: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(DirectoryEntry {
            destination: Destination {
                agent: agent.to_string(),
                namespace: namespace.map(str::to_string),
                address: address.to_string(),
            },
            capabilities: capabilities.into_iter().map(Into::into).collect::<BTreeSet<_>>(),
            health: AgentHealth::Healthy,
        });
    }

    /// Record health as reported by the agent. Returns `false` if unknown.
    pub fn set_health(&self, agent: &str, namespace: Option<&str>, health: AgentHealth) -> bool {
        let key = (agent.to_string(), namespace.map(str::to_string));
        match self.entries.write().get_mut(&key) {
            Some(entry) => {
                entry.health = health;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, agent: &str, namespace: Option<&str>) -> bool {
        let key = (agent.to_string(), namespace.map(str::to_string));
        self.entries.write().remove(&key).is_some()
    }
}

impl AgentDirectory for InMemoryDirectory {
    fn lookup(&self, target: &Target) -> Option<DirectoryEntry> {
        let key = (target.agent.clone(), target.namespace.clone());
        self.entries.read().get(&key).cloned()
    }
}
