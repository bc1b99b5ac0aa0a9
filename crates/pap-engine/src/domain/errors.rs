//! # Engine Errors
//!
//! One error enum per pipeline stage. Each maps onto exactly one PAP
//! [`ErrorCode`] so a rejection can always be answered with an `error`
//! envelope.

use pap_crypto::CryptoError;
use pap_types::{ErrorCode, PapError};
use thiserror::Error;

/// Authentication and freshness failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Algorithm not enabled on this engine.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// `payloadHash` does not match the body digest.
    #[error("Payload hash mismatch")]
    PayloadHashMismatch,

    /// No key registered for the sender.
    #[error("No key registered for {0}")]
    UnknownSender(String),

    /// The sender's registered key uses another algorithm.
    #[error("Algorithm mismatch: registered {registered}, envelope {presented}")]
    AlgorithmMismatch {
        registered: String,
        presented: String,
    },

    /// Signature or key material rejected.
    #[error("Signature rejected: {0}")]
    BadSignature(CryptoError),

    /// `issuedAt` is older than the skew allows.
    #[error("Stale envelope: issued {age_secs}s ago")]
    Stale { age_secs: i64 },

    /// `issuedAt` is further in the future than the skew allows.
    #[error("Envelope issued {ahead_secs}s in the future")]
    FromFuture { ahead_secs: i64 },

    /// `(agent, nonce)` already seen inside the replay window.
    #[error("Replayed nonce for {agent}")]
    Replay { agent: String },
}

impl AuthError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::UnsupportedAlgorithm(_) => ErrorCode::VersionUnsupported,
            AuthError::PayloadHashMismatch | AuthError::FromFuture { .. } => {
                ErrorCode::BadRequest
            }
            AuthError::UnknownSender(_)
            | AuthError::AlgorithmMismatch { .. }
            | AuthError::BadSignature(_) => ErrorCode::Unauthorized,
            AuthError::Stale { .. } => ErrorCode::Timeout,
            AuthError::Replay { .. } => ErrorCode::Conflict,
        }
    }
}

impl From<AuthError> for PapError {
    fn from(err: AuthError) -> Self {
        PapError::new(err.code(), err.to_string())
    }
}

/// Structural or authentication failure of an inbound envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed envelope: {0}")]
    Structural(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ValidationError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::Structural(_) => ErrorCode::BadRequest,
            ValidationError::Auth(err) => err.code(),
        }
    }
}

impl From<ValidationError> for PapError {
    fn from(err: ValidationError) -> Self {
        PapError::new(err.code(), err.to_string())
    }
}

/// Invoke routing failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Deadline already elapsed")]
    DeadlineElapsed,

    #[error("Unknown target agent: {0}")]
    UnknownAgent(String),

    #[error("Agent {agent} does not offer capability {capability}")]
    CapabilityMissing { agent: String, capability: String },

    #[error("Agent {agent} unhealthy: {reason}")]
    Unhealthy { agent: String, reason: String },

    #[error("Agent {0} busy")]
    Busy(String),
}

impl DispatchError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::DeadlineElapsed => ErrorCode::Timeout,
            DispatchError::UnknownAgent(_) => ErrorCode::NotFound,
            DispatchError::CapabilityMissing { .. } => ErrorCode::Forbidden,
            DispatchError::Unhealthy { .. } => ErrorCode::AgentUnhealthy,
            DispatchError::Busy(_) => ErrorCode::AgentBusy,
        }
    }
}

impl From<DispatchError> for PapError {
    fn from(err: DispatchError) -> Self {
        PapError::new(err.code(), err.to_string())
    }
}

/// Correlation tracker failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// An exchange with this id is already pending.
    #[error("Correlation {0} already pending")]
    DuplicateExchange(String),

    /// A terminal reply for an exchange that was already retired.
    #[error("Correlation {0} already retired")]
    AlreadyRetired(String),

    #[error("Correlation {0} not pending")]
    NotPending(String),
}

impl CorrelationError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            CorrelationError::DuplicateExchange(_) | CorrelationError::AlreadyRetired(_) => {
                ErrorCode::Conflict
            }
            CorrelationError::NotPending(_) => ErrorCode::NotFound,
        }
    }
}

impl From<CorrelationError> for PapError {
    fn from(err: CorrelationError) -> Self {
        PapError::new(err.code(), err.to_string())
    }
}

/// Streaming reassembly failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Stream {0} already finished")]
    AlreadyFinished(String),
}

impl From<StreamError> for PapError {
    fn from(err: StreamError) -> Self {
        PapError::new(ErrorCode::Conflict, err.to_string())
    }
}

/// Control scheduling failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Directive {0} already scheduled")]
    AlreadyScheduled(String),

    #[error("Directive {0} not found")]
    NotFound(String),

    #[error("Directive {0} cannot be cancelled")]
    NotCancelable(String),

    #[error("Directive {0} already released")]
    AlreadyReleased(String),

    #[error("Directive {0} already cancelled")]
    AlreadyCancelled(String),
}

impl ControlError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            ControlError::AlreadyScheduled(_)
            | ControlError::AlreadyReleased(_)
            | ControlError::AlreadyCancelled(_) => ErrorCode::Conflict,
            ControlError::NotFound(_) => ErrorCode::NotFound,
            ControlError::NotCancelable(_) => ErrorCode::Forbidden,
        }
    }
}

impl From<ControlError> for PapError {
    fn from(err: ControlError) -> Self {
        PapError::new(err.code(), err.to_string())
    }
}
