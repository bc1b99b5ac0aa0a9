//! # Processing Outcomes
//!
//! What `process` returns: an `Outcome` for accepted envelopes, a
//! `Rejection` carrying the outbound error body otherwise.

use chrono::{DateTime, Utc};
use pap_types::{ErrorCode, ErrorPayload, EventType, MessageKind, PapError};
use thiserror::Error;

use super::control::DirectiveHandle;
use crate::ports::outbound::Destination;

/// What the engine did with an accepted envelope.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Invoke resolved to a destination.
    Dispatched {
        destination: Destination,
        awaiting_reply: bool,
        /// Effective deadline of the registered exchange.
        deadline: Option<DateTime<Utc>>,
    },
    /// Response matched a pending exchange and its chunks were appended.
    ResponseMatched { chunks: usize, retired: bool },
    /// Error retired a pending exchange.
    ErrorMatched { code: ErrorCode },
    /// Handshake ack retired a ping exchange.
    HandshakeAcked { accepted: bool },
    /// Control directive scheduled (or already released).
    DirectiveScheduled {
        handle: DirectiveHandle,
        released: bool,
        /// Exchange a `force_kill` cancelled, if any.
        cancelled_exchange: Option<String>,
    },
    EventAccepted { event_type: EventType },
    /// Reply to a correlation the tracker does not know.
    Orphaned,
    /// Terminal reply to an already-retired correlation.
    DuplicateTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    Orphaned,
    DuplicateTerminal,
}

/// Non-fatal condition attached to an accepted envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub message_id: String,
    pub correlation_id: String,
    pub kind: MessageKind,
    pub disposition: Disposition,
    pub warnings: Vec<Warning>,
}

impl Outcome {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A fatal condition for one envelope.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
    /// Body of the `error` envelope to send back.
    pub reply: ErrorPayload,
}

impl Rejection {
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }
}

impl From<PapError> for Rejection {
    fn from(error: PapError) -> Self {
        Self {
            code: error.code,
            message: error.message.clone(),
            reply: error.to_error_payload(),
        }
    }
}

/// Result of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub replay_purged: usize,
    pub timed_out: usize,
    pub released: usize,
    /// Tombstones, finished streams and settled directives forgotten.
    pub evicted: usize,
}
