//! # PAP Envelope Engine
//!
//! Validates, authenticates and routes Process Agent Protocol envelopes.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): pipeline stages, no I/O
//! - **Ports Layer** (`ports/`): inbound API and outbound collaborators
//! - **Adapters** (`adapters/`): in-memory collaborators and clocks
//! - **Service Layer** (`service.rs`): wires domain logic to ports
//!
//! ## Pipeline
//!
//! 1. Structural checks (`BAD_REQUEST`)
//! 2. Authentication: algorithm, payload hash, signature, freshness, replay
//! 3. Per-kind handling: dispatch, correlation, streaming, control timing
//!
//! ## Security Notes
//!
//! - A nonce is recorded only after every other check passed
//! - Freshness window and replay window are configuration, never hard-coded
//! - The engine never retries; `recoverable` on the error reply tells the caller

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::clock::{ManualClock, SystemClock};
pub use adapters::delivery::{ChannelDelivery, RecordingDelivery};
pub use adapters::directory::InMemoryDirectory;
pub use adapters::keys::InMemoryKeyRegistry;
pub use domain::auth::{AuthVerifier, Verified};
pub use domain::config::{ConfigError, EngineConfig};
pub use domain::control::{ControlScheduler, DirectiveHandle};
pub use domain::correlation::{CorrelationTracker, ExchangeKind, MatchResult, TimedOut};
pub use domain::dispatch::Dispatcher;
pub use domain::errors::{
    AuthError, ControlError, CorrelationError, DispatchError, StreamError, ValidationError,
};
pub use domain::outcome::{Disposition, Outcome, Rejection, SweepReport, Warning, WarningKind};
pub use domain::replay::ReplayGuard;
pub use domain::streaming::{ChunkItem, ChunkStream, StreamAssembler};
pub use domain::validator::{check_structure, EnvelopeValidator, ValidEnvelope};
pub use ports::inbound::EnvelopeProcessingApi;
pub use ports::outbound::{
    AgentDirectory, AgentHealth, Clock, Destination, DirectiveDelivery, DirectoryEntry,
    KeyRegistry, RegisteredKey,
};
pub use service::{EngineDeps, EnvelopeEngine, FORCE_KILL_CORRELATION_ARG};
