//! # Dispatcher
//!
//! Resolves an `invoke` target through the agent directory. Health states
//! are relayed as reported by the destination; nothing is computed locally.

use chrono::{DateTime, Utc};
use pap_types::Invoke;
use std::sync::Arc;
use tracing::debug;

use super::errors::DispatchError;
use crate::ports::outbound::{AgentDirectory, AgentHealth, Destination};

pub struct Dispatcher {
    directory: Arc<dyn AgentDirectory>,
}

impl Dispatcher {
    pub fn new(directory: Arc<dyn AgentDirectory>) -> Self {
        Self { directory }
    }

    /// Destination for `invoke`, checked in order: deadline, agent,
    /// capability, health.
    pub fn resolve(&self, invoke: &Invoke, now: DateTime<Utc>) -> Result<Destination, DispatchError> {
        if invoke.deadline.is_some_and(|deadline| deadline <= now) {
            return Err(DispatchError::DeadlineElapsed);
        }

        let target = &invoke.target;
        let entry = self
            .directory
            .lookup(target)
            .ok_or_else(|| DispatchError::UnknownAgent(target.agent.clone()))?;

        if let Some(capability) = &target.capability {
            if !entry.capabilities.contains(capability) {
                return Err(DispatchError::CapabilityMissing {
                    agent: target.agent.clone(),
                    capability: capability.clone(),
                });
            }
        }

        match entry.health {
            AgentHealth::Healthy => {}
            AgentHealth::Unhealthy { reason } => {
                return Err(DispatchError::Unhealthy {
                    agent: target.agent.clone(),
                    reason,
                })
            }
            AgentHealth::Busy => return Err(DispatchError::Busy(target.agent.clone())),
        }

        debug!(agent = %target.agent, address = %entry.destination.address, "Target resolved");
        Ok(entry.destination)
    }
}
