//! Trace context carried by envelopes.
//!
//! Envelopes may carry a `traceId` (32 hex chars) and `spanId` (16 hex
//! chars) from the sender's tracing system. The engine parses them into an
//! OpenTelemetry `SpanContext` marked remote, and runs processing inside a
//! span tagged with those ids so engine logs join the caller's trace.
//!
//! ## Example
//!
//! ```rust,ignore
//! let ctx = TraceContext::from_envelope_ids(env.trace_id.as_deref(), env.span_id.as_deref());
//! let span = ctx.envelope_span(&env.message_id, env.kind().as_str());
//! let _guard = span.enter();
//! ```

use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
use serde::{Deserialize, Serialize};

/// Trace ids in their wire form, as forwarded on notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedContext {
    /// Trace ID (32 hex characters)
    pub trace_id: String,
    /// Parent span ID (16 hex characters)
    pub span_id: String,
}

impl PropagatedContext {
    /// Convert back into a parsed context.
    pub fn to_context(&self) -> TraceContext {
        TraceContext::from_envelope_ids(Some(&self.trace_id), Some(&self.span_id))
    }
}

/// Parsed remote span context, or none.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    span_context: Option<SpanContext>,
}

impl TraceContext {
    /// Create an empty trace context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the optional envelope ids.
    ///
    /// Both ids must be present, well-formed hex and non-zero; anything else
    /// yields an empty context.
    pub fn from_envelope_ids(trace_id: Option<&str>, span_id: Option<&str>) -> Self {
        let (Some(trace_hex), Some(span_hex)) = (trace_id, span_id) else {
            return Self::new();
        };
        if trace_hex.len() != 32 || span_hex.len() != 16 {
            return Self::new();
        }
        let (Ok(trace_id), Ok(span_id)) = (TraceId::from_hex(trace_hex), SpanId::from_hex(span_hex))
        else {
            return Self::new();
        };

        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );

        Self {
            span_context: span_context.is_valid().then_some(span_context),
        }
    }

    /// Check if this context has a valid trace.
    pub fn is_valid(&self) -> bool {
        self.span_context.is_some()
    }

    pub fn to_propagated(&self) -> Option<PropagatedContext> {
        self.span_context.as_ref().map(|ctx| PropagatedContext {
            trace_id: ctx.trace_id().to_string(),
            span_id: ctx.span_id().to_string(),
        })
    }

    /// Span wrapping the processing of one envelope.
    pub fn envelope_span(&self, message_id: &str, kind: &str) -> tracing::Span {
        match &self.span_context {
            Some(ctx) => tracing::info_span!(
                "pap_envelope",
                otel.trace_id = %ctx.trace_id(),
                otel.parent_id = %ctx.span_id(),
                message_id = %message_id,
                kind = %kind,
            ),
            None => tracing::info_span!("pap_envelope", message_id = %message_id, kind = %kind),
        }
    }
}
