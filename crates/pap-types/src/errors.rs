//! # Error Taxonomy
//!
//! The closed set of status/error codes shared by every PAP component.
//!
//! Codes fall into three failure kinds plus the two success codes:
//!
//! | Kind | Codes | Engine behaviour |
//! |------|-------|------------------|
//! | Structural | `BAD_REQUEST` | never retried, caller resends a corrected envelope |
//! | Authentication | `UNAUTHORIZED`, `CONFLICT`, `TIMEOUT` | fatal to the envelope, logged |
//! | Dispatch | `NOT_FOUND`, `FORBIDDEN`, `AGENT_*`, ... | surfaced as an `ErrorMessage` |

use crate::envelope::ErrorMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Closed enumeration of PAP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Ok,
    Accepted,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    Conflict,
    RateLimited,
    AgentUnhealthy,
    AgentBusy,
    DependencyFailed,
    InternalError,
    ProxyError,
    VersionUnsupported,
}

/// Which of the failure kinds a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// `OK` / `ACCEPTED`.
    Success,
    /// Malformed or incomplete envelope.
    Structural,
    /// Signature, replay or freshness failure.
    Authentication,
    /// Resolution or runtime failure reported to the invoking agent.
    Dispatch,
}

impl ErrorCode {
    /// All codes, in declaration order.
    pub const ALL: [ErrorCode; 15] = [
        ErrorCode::Ok,
        ErrorCode::Accepted,
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::Timeout,
        ErrorCode::Conflict,
        ErrorCode::RateLimited,
        ErrorCode::AgentUnhealthy,
        ErrorCode::AgentBusy,
        ErrorCode::DependencyFailed,
        ErrorCode::InternalError,
        ErrorCode::ProxyError,
        ErrorCode::VersionUnsupported,
    ];

    /// Wire representation of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::Accepted => "ACCEPTED",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::AgentUnhealthy => "AGENT_UNHEALTHY",
            ErrorCode::AgentBusy => "AGENT_BUSY",
            ErrorCode::DependencyFailed => "DEPENDENCY_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ProxyError => "PROXY_ERROR",
            ErrorCode::VersionUnsupported => "VERSION_UNSUPPORTED",
        }
    }

    /// Returns true for `OK` and `ACCEPTED`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Ok | ErrorCode::Accepted)
    }

    /// Transient codes a caller may retry on its own.
    ///
    /// The engine itself never retries; it only sets the flag.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::AgentBusy | ErrorCode::RateLimited | ErrorCode::DependencyFailed
        )
    }

    /// Failure kind of this code.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::Ok | ErrorCode::Accepted => ErrorCategory::Success,
            ErrorCode::BadRequest => ErrorCategory::Structural,
            ErrorCode::Unauthorized | ErrorCode::Conflict | ErrorCode::Timeout => {
                ErrorCategory::Authentication
            }
            ErrorCode::Forbidden
            | ErrorCode::NotFound
            | ErrorCode::RateLimited
            | ErrorCode::AgentUnhealthy
            | ErrorCode::AgentBusy
            | ErrorCode::DependencyFailed
            | ErrorCode::InternalError
            | ErrorCode::ProxyError
            | ErrorCode::VersionUnsupported => ErrorCategory::Dispatch,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level failure carrying one taxonomy code.
///
/// Every component error converts into this before it leaves the engine.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct PapError {
    /// Taxonomy code.
    pub code: ErrorCode,
    /// Human readable reason.
    pub message: String,
    /// Optional structured context.
    pub details: Option<BTreeMap<String, Value>>,
}

impl PapError {
    /// Create an error with the given code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Shorthand for `BAD_REQUEST`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Shorthand for `INTERNAL_ERROR`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Attach a structured detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Whether the caller may retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    /// Build the outbound `error` message body for this failure.
    #[must_use]
    pub fn to_error_payload(&self) -> ErrorMessage {
        ErrorMessage {
            code: self.code,
            message: self.message.clone(),
            recoverable: Some(self.code.is_recoverable()),
            details: self.details.clone(),
        }
    }
}

impl From<&ErrorMessage> for PapError {
    fn from(msg: &ErrorMessage) -> Self {
        Self {
            code: msg.code,
            message: msg.message.clone(),
            details: msg.details.clone(),
        }
    }
}
