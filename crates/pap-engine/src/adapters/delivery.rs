//! Directive delivery adapters.
//!
//! - `RecordingDelivery` keeps every released directive in memory.
//! - `ChannelDelivery` forwards them to a transport task over an mpsc channel.

use async_trait::async_trait;
use pap_bus::ReleasedDirective;
use pap_types::{ErrorCode, PapError};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::ports::outbound::DirectiveDelivery;

#[derive(Debug, Default)]
pub struct RecordingDelivery {
    delivered: Mutex<Vec<ReleasedDirective>>,
    failure: Mutex<Option<PapError>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following delivery fail with `error`.
    pub fn fail_with(&self, error: PapError) {
        *self.failure.lock() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Directives delivered so far, in release order.
    pub fn delivered(&self) -> Vec<ReleasedDirective> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl DirectiveDelivery for RecordingDelivery {
    async fn deliver(&self, directive: ReleasedDirective) -> Result<(), PapError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        self.delivered.lock().push(directive);
        Ok(())
    }
}

/// Forwards released directives to whoever holds the receiver.
///
/// Enqueues without waiting: a full queue fails the delivery with
/// `AGENT_BUSY` instead of parking the caller.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    sender: mpsc::Sender<ReleasedDirective>,
}

impl ChannelDelivery {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ReleasedDirective>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DirectiveDelivery for ChannelDelivery {
    async fn deliver(&self, directive: ReleasedDirective) -> Result<(), PapError> {
        let message_id = directive.message_id.clone();
        self.sender.try_send(directive).map_err(|e| match e {
            TrySendError::Full(_) => {
                PapError::new(ErrorCode::AgentBusy, "directive transport saturated")
            }
            TrySendError::Closed(_) => {
                PapError::new(ErrorCode::DependencyFailed, "directive transport closed")
            }
        })?;
        debug!(message_id = %message_id, "Directive handed to transport");
        Ok(())
    }
}
