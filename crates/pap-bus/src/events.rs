//! # Engine Events
//!
//! Notifications the engine emits for conditions that have no synchronous
//! caller: timer-driven retirements, directive releases and non-fatal
//! anomalies (orphans, duplicate terminals).

use chrono::{DateTime, Utc};
use pap_types::{AgentIdentity, ControlType, ErrorMessage, JsonObject, MessageKind};
use serde::{Deserialize, Serialize};

/// Why an exchange left the correlation tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirementReason {
    /// A `response` with `isFinal = true` arrived.
    Final,
    /// An `error` arrived.
    Error,
    /// A `handshake_ack` answered a ping.
    Acknowledged,
    /// The deadline elapsed; a `TIMEOUT` was synthesized.
    Timeout,
    /// Explicit cancel or `force_kill`.
    Cancelled,
}

impl RetirementReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RetirementReason::Final => "final",
            RetirementReason::Error => "error",
            RetirementReason::Acknowledged => "acknowledged",
            RetirementReason::Timeout => "timeout",
            RetirementReason::Cancelled => "cancelled",
        }
    }
}

/// A control directive handed to the delivery collaborator.
///
/// The engine only decides *when*; the target agent applies the effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleasedDirective {
    pub control_type: ControlType,
    pub arguments: Option<JsonObject>,
    /// `messageId` of the control envelope.
    pub message_id: String,
    /// Correlation key of the control envelope.
    pub correlation_id: String,
    /// Agent that issued the directive.
    pub requester: AgentIdentity,
    pub enforce_at: Option<DateTime<Utc>>,
    pub released_at: DateTime<Utc>,
    /// False for `force_kill`.
    pub cancelable: bool,
    /// True for `force_kill`: the target skips its graceful shutdown period.
    pub bypass_grace_period: bool,
}

/// All events that can be published to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Deadline elapsed with no terminal reply. Emitted exactly once.
    ExchangeTimedOut {
        correlation_id: String,
        /// Agent waiting on the exchange.
        requester: AgentIdentity,
        /// Synthesized `TIMEOUT` error for the waiting caller.
        error: ErrorMessage,
    },

    /// An exchange was retired for any reason.
    ExchangeRetired {
        correlation_id: String,
        reason: RetirementReason,
    },

    /// A scheduled directive was released to its target.
    DirectiveReleased { directive: ReleasedDirective },

    /// A reply named a correlation the tracker never knew.
    OrphanedReply {
        correlation_id: String,
        kind: MessageKind,
    },

    /// A terminal reply arrived for an already-retired correlation.
    DuplicateTerminal { correlation_id: String },
}

impl EngineEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            EngineEvent::ExchangeTimedOut { .. } | EngineEvent::ExchangeRetired { .. } => {
                EventTopic::Correlation
            }
            EngineEvent::DirectiveReleased { .. } => EventTopic::Control,
            EngineEvent::OrphanedReply { .. } | EngineEvent::DuplicateTerminal { .. } => {
                EventTopic::Anomaly
            }
        }
    }

    /// Correlation key the event concerns.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        match self {
            EngineEvent::ExchangeTimedOut { correlation_id, .. }
            | EngineEvent::ExchangeRetired { correlation_id, .. }
            | EngineEvent::OrphanedReply { correlation_id, .. }
            | EngineEvent::DuplicateTerminal { correlation_id } => correlation_id,
            EngineEvent::DirectiveReleased { directive } => &directive.correlation_id,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Exchange retirement and timeout.
    Correlation,
    /// Directive release.
    Control,
    /// Orphans and duplicate terminals.
    Anomaly,
    /// All events (wildcard).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Correlation ids to include. Empty means all correlations.
    pub correlation_ids: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            correlation_ids: Vec::new(),
        }
    }

    /// Create a filter for a single correlation.
    #[must_use]
    pub fn correlation(correlation_id: impl Into<String>) -> Self {
        Self {
            topics: Vec::new(),
            correlation_ids: vec![correlation_id.into()],
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &EngineEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let correlation_match = self.correlation_ids.is_empty()
            || self
                .correlation_ids
                .iter()
                .any(|id| id == event.correlation_id());

        topic_match && correlation_match
    }
}
