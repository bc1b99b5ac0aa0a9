//! # Envelope Validator
//!
//! Cheap structural checks first, then authentication. A structural failure
//! is always `BAD_REQUEST` and never reaches the verifier.

use chrono::{DateTime, Utc};
use pap_types::{Envelope, EventDetail, MessageBody, SPAN_ID_HEX_LEN, TRACE_ID_HEX_LEN};

use super::auth::{AuthVerifier, Verified};
use super::errors::ValidationError;

/// An envelope that passed structural and authentication checks.
#[derive(Debug, Clone)]
pub struct ValidEnvelope {
    envelope: Envelope,
    verified: Verified,
}

impl ValidEnvelope {
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    #[must_use]
    pub fn verified(&self) -> &Verified {
        &self.verified
    }

    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }
}

pub struct EnvelopeValidator {
    verifier: AuthVerifier,
}

impl EnvelopeValidator {
    pub fn new(verifier: AuthVerifier) -> Self {
        Self { verifier }
    }

    pub fn validate(
        &self,
        envelope: Envelope,
        now: DateTime<Utc>,
    ) -> Result<ValidEnvelope, ValidationError> {
        check_structure(&envelope)?;
        let verified = self.verifier.verify(&envelope, now)?;
        Ok(ValidEnvelope { envelope, verified })
    }
}

/// Structural rules. Pure: no state is read or written.
pub fn check_structure(envelope: &Envelope) -> Result<(), ValidationError> {
    non_empty("messageId", &envelope.message_id)?;
    non_empty("sender.agent", &envelope.sender.agent)?;
    non_empty("sender.cluster", &envelope.sender.cluster)?;
    non_empty("auth.nonce", &envelope.auth.nonce)?;
    if envelope.auth.signature.is_empty() {
        return Err(structural("auth.signature is empty"));
    }
    if let Some(correlation_id) = &envelope.correlation_id {
        non_empty("correlationId", correlation_id)?;
    }
    if let Some(trace_id) = &envelope.trace_id {
        fixed_hex("traceId", trace_id, TRACE_ID_HEX_LEN)?;
    }
    if let Some(span_id) = &envelope.span_id {
        fixed_hex("spanId", span_id, SPAN_ID_HEX_LEN)?;
    }

    match &envelope.body {
        MessageBody::Invoke(invoke) => {
            non_empty("invoke.target.agent", &invoke.target.agent)?;
            non_empty("invoke.method", &invoke.method)?;
            if let Some(namespace) = &invoke.target.namespace {
                non_empty("invoke.target.namespace", namespace)?;
            }
        }
        MessageBody::Response(response) => {
            for (index, chunk) in response.chunks().iter().enumerate() {
                if chunk.content_type.trim().is_empty() {
                    return Err(structural(format!(
                        "response.outputs[{index}].contentType is empty"
                    )));
                }
            }
        }
        MessageBody::Event(event) => {
            if let Some(detail) = &event.detail {
                if detail.event_type() != event.event_type {
                    return Err(structural(format!(
                        "event detail does not match eventType {:?}",
                        event.event_type
                    )));
                }
                if let EventDetail::Metric(batch) = detail {
                    if batch.points.is_empty() {
                        return Err(structural("metric batch has no points"));
                    }
                }
            }
        }
        MessageBody::Error(error) => {
            non_empty("error.message", &error.message)?;
        }
        MessageBody::Control(_) | MessageBody::HandshakeAck(_) => {}
    }
    Ok(())
}

fn structural(reason: impl Into<String>) -> ValidationError {
    ValidationError::Structural(reason.into())
}

fn non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(structural(format!("{field} is empty")));
    }
    Ok(())
}

fn fixed_hex(field: &str, value: &str, len: usize) -> Result<(), ValidationError> {
    let lower_hex = hex::decode(value).is_ok() && !value.bytes().any(|b| b.is_ascii_uppercase());
    if value.len() != len || !lower_hex {
        return Err(structural(format!(
            "{field} must be {len} lowercase hex characters"
        )));
    }
    Ok(())
}
