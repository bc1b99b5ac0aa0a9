//! # Wire Form
//!
//! JSON encoding of envelopes as they travel between agents.
//!
//! Decoding is two-phase: the envelope is first read with an untyped body so
//! the `kind` tag and the populated field set can be checked against each
//! other, then the body is converted into the typed `MessageBody`. A body
//! that carries fields of another variant is rejected rather than silently
//! dropped.

use crate::envelope::{AgentIdentity, AuthContext, Envelope, MessageBody, MessageKind};
use crate::errors::{ErrorCode, PapError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while decoding the wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("body has no kind")]
    MissingKind,

    #[error("unknown body kind: {0}")]
    UnknownKind(String),

    #[error("field '{field}' is not allowed for kind '{kind}'")]
    FieldNotAllowed { kind: MessageKind, field: String },

    #[error("invalid {kind} body: {reason}")]
    InvalidBody { kind: MessageKind, reason: String },
}

impl From<WireError> for PapError {
    fn from(err: WireError) -> Self {
        PapError::new(ErrorCode::BadRequest, err.to_string())
    }
}

/// Envelope with an untyped body, as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub sender: AgentIdentity,
    pub auth: AuthContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    pub body: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// Body fields each kind may populate, in wire naming.
#[must_use]
pub fn allowed_fields(kind: MessageKind) -> &'static [&'static str] {
    match kind {
        MessageKind::Invoke => &[
            "target",
            "method",
            "arguments",
            "deadline",
            "expectReply",
            "metadata",
        ],
        MessageKind::Response => &["status", "outputs", "metadata", "isFinal"],
        MessageKind::Event => &["eventType", "context", "detail"],
        MessageKind::Error => &["code", "message", "recoverable", "details"],
        MessageKind::Control => &["controlType", "arguments", "enforceAt"],
        MessageKind::HandshakeAck => &["accepted", "reason"],
    }
}

impl WireEnvelope {
    /// Check the body's `kind` against its populated fields.
    pub fn body_kind(&self) -> Result<MessageKind, WireError> {
        let tag = match self.body.get("kind") {
            Some(Value::String(tag)) => tag,
            Some(_) | None => return Err(WireError::MissingKind),
        };
        let kind =
            MessageKind::from_tag(tag).ok_or_else(|| WireError::UnknownKind(tag.clone()))?;

        let allowed = allowed_fields(kind);
        for (field, value) in &self.body {
            if field == "kind" || value.is_null() {
                continue;
            }
            if !allowed.contains(&field.as_str()) {
                return Err(WireError::FieldNotAllowed {
                    kind,
                    field: field.clone(),
                });
            }
        }
        Ok(kind)
    }

    /// Convert into the typed envelope.
    pub fn into_envelope(self) -> Result<Envelope, WireError> {
        let kind = self.body_kind()?;
        let body: MessageBody = serde_json::from_value(Value::Object(self.body))
            .map_err(|e| WireError::InvalidBody {
                kind,
                reason: e.to_string(),
            })?;

        Ok(Envelope {
            message_id: self.message_id,
            parent_id: self.parent_id,
            correlation_id: self.correlation_id,
            sent_at: self.sent_at,
            sender: self.sender,
            auth: self.auth,
            annotations: self.annotations,
            body,
            trace_id: self.trace_id,
            span_id: self.span_id,
        })
    }
}

/// Decode an envelope from JSON bytes.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, WireError> {
    let wire: WireEnvelope =
        serde_json::from_slice(bytes).map_err(|e| WireError::Malformed(e.to_string()))?;
    wire.into_envelope()
}

/// Encode an envelope as compact JSON.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, PapError> {
    serde_json::to_vec(envelope)
        .map_err(|e| PapError::internal(format!("envelope encoding failed: {e}")))
}
