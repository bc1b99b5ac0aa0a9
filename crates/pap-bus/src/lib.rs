//! # PAP Bus - Engine Notifications
//!
//! Carries the events the engine raises outside a `process` call: exchange
//! timeouts, retirements, directive releases and non-fatal anomalies.
//!
//! ```text
//! ┌──────────────┐   publish()   ┌──────────────┐  subscribe()  ┌──────────────┐
//! │ PAP Engine   │ ────────────► │  Event Bus   │ ────────────► │  Observers   │
//! │ (timers too) │               │  (broadcast) │               │ (transport)  │
//! └──────────────┘               └──────────────┘               └──────────────┘
//! ```
//!
//! Delivery is best effort: with no subscribers an event is dropped, and a
//! lagging subscriber skips the events it missed.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EngineEvent, EventFilter, EventTopic, ReleasedDirective, RetirementReason};
pub use publisher::{EventPublisher, InMemoryEventBus, NoopPublisher};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
