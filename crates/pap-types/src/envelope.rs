//! # PAP Envelope
//!
//! The authenticated wrapper around every protocol message.
//!
//! ## Properties
//!
//! - **Identity**: `sender` is the claimed origin; the auth verifier checks it
//!   against registered key material.
//! - **Correlation**: request/response/stream flows share a `correlation_id`,
//!   defaulting to the initiating `message_id`.
//! - **Replay Prevention**: `auth.nonce` is single-use per sender inside the
//!   freshness window around `auth.issued_at`.
//! - **Exhaustive Bodies**: the six message kinds form a closed sum type.

use crate::errors::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::base64::Base64;
use serde_with::serde_as;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Free-form JSON object, ordered by key.
pub type JsonObject = BTreeMap<String, Value>;

/// Length of a rendered trace id (16 bytes as lowercase hex).
pub const TRACE_ID_HEX_LEN: usize = 32;

/// Length of a rendered span id (8 bytes as lowercase hex).
pub const SPAN_ID_HEX_LEN: usize = 16;

// =============================================================================
// IDENTITY & AUTH
// =============================================================================

/// Identity of an agent participating in PAP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    /// Logical agent name.
    pub agent: String,
    /// Cluster the agent runs in.
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl AgentIdentity {
    /// Create an identity without version or instance.
    pub fn new(agent: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            cluster: cluster.into(),
            version: None,
            instance: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.agent, self.cluster)?;
        if let Some(instance) = &self.instance {
            write!(f, "/{instance}")?;
        }
        Ok(())
    }
}

/// Signature algorithm named in an `AuthContext`.
///
/// The set is open: unknown names are kept in `Other` so the verifier can
/// reject them with `VERSION_UNSUPPORTED` instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SignatureAlgorithm {
    Ed25519,
    EcdsaP256,
    EcdsaSecp256k1,
    Other(String),
}

impl SignatureAlgorithm {
    /// Wire name of the algorithm.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SignatureAlgorithm::Ed25519 => "ed25519",
            SignatureAlgorithm::EcdsaP256 => "ecdsa-p256",
            SignatureAlgorithm::EcdsaSecp256k1 => "ecdsa-secp256k1",
            SignatureAlgorithm::Other(name) => name,
        }
    }

    /// Algorithms this implementation can verify.
    #[must_use]
    pub fn known() -> Vec<SignatureAlgorithm> {
        vec![
            SignatureAlgorithm::Ed25519,
            SignatureAlgorithm::EcdsaP256,
            SignatureAlgorithm::EcdsaSecp256k1,
        ]
    }
}

impl From<String> for SignatureAlgorithm {
    fn from(name: String) -> Self {
        match name.as_str() {
            "ed25519" => SignatureAlgorithm::Ed25519,
            "ecdsa-p256" => SignatureAlgorithm::EcdsaP256,
            "ecdsa-secp256k1" => SignatureAlgorithm::EcdsaSecp256k1,
            _ => SignatureAlgorithm::Other(name),
        }
    }
}

impl From<SignatureAlgorithm> for String {
    fn from(alg: SignatureAlgorithm) -> Self {
        alg.as_str().to_string()
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication metadata attached to every envelope.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    /// Raw signature bytes (base64 on the wire).
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
    /// SHA-256 of the canonical body serialization (base64 on the wire).
    #[serde_as(as = "Base64")]
    pub payload_hash: Vec<u8>,
    /// Single-use value, unique per signature.
    pub nonce: String,
    /// Signing time.
    pub issued_at: DateTime<Utc>,
}

// =============================================================================
// MESSAGE BODIES
// =============================================================================

/// Destination named by an `invoke`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl Target {
    pub fn agent(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            namespace: None,
            capability: None,
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }
}

/// A command issued to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoke {
    pub target: Target,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_reply: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Invoke {
    pub fn new(target: Target, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
            arguments: None,
            deadline: None,
            expect_reply: None,
            metadata: None,
        }
    }

    /// `expectReply` defaults to true when absent.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.expect_reply.unwrap_or(true)
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_expect_reply(mut self, expect_reply: bool) -> Self {
        self.expect_reply = Some(expect_reply);
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: JsonObject) -> Self {
        self.arguments = Some(arguments);
        self
    }
}

/// One piece of a (possibly streamed) response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputChunk {
    pub content_type: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<JsonObject>,
}

impl OutputChunk {
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
            annotations: None,
        }
    }
}

/// Reply to an `invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<OutputChunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
}

impl Response {
    pub fn new(status: ErrorCode) -> Self {
        Self {
            status,
            outputs: None,
            metadata: None,
            is_final: None,
        }
    }

    /// `isFinal` defaults to true when absent: a single-shot reply.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final.unwrap_or(true)
    }

    /// Chunks carried by this response, in emission order.
    #[must_use]
    pub fn chunks(&self) -> &[OutputChunk] {
        self.outputs.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn with_final(mut self, is_final: bool) -> Self {
        self.is_final = Some(is_final);
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<OutputChunk>) -> Self {
        self.outputs = Some(outputs);
        self
    }
}

/// Event families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Heartbeat,
    Log,
    Alert,
    Metric,
}

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub uptime_seconds: f64,
    pub active_jobs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gauges: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<JsonObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBatch {
    pub points: Vec<MetricPoint>,
}

/// Typed payload of an event, discriminated by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDetail {
    Heartbeat(Heartbeat),
    Log(LogEvent),
    Alert(AlertEvent),
    Metric(MetricBatch),
}

impl EventDetail {
    /// The event type this detail belongs to.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            EventDetail::Heartbeat(_) => EventType::Heartbeat,
            EventDetail::Log(_) => EventType::Log,
            EventDetail::Alert(_) => EventType::Alert,
            EventDetail::Metric(_) => EventType::Metric,
        }
    }
}

/// Fire-and-forget notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<EventDetail>,
}

impl Event {
    pub fn new(detail: EventDetail) -> Self {
        Self {
            event_type: detail.event_type(),
            context: None,
            detail: Some(detail),
        }
    }
}

/// Error reply carrying one taxonomy code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recoverable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonObject>,
}

/// The outbound error body, as produced by `PapError::to_error_payload`.
pub type ErrorPayload = ErrorMessage;

/// Control-plane directive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Terminate,
    ForceKill,
    Pause,
    Resume,
    Ping,
}

impl ControlType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlType::Terminate => "terminate",
            ControlType::ForceKill => "force_kill",
            ControlType::Pause => "pause",
            ControlType::Resume => "resume",
            ControlType::Ping => "ping",
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle directive (terminate, pause, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDirective {
    pub control_type: ControlType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<JsonObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_at: Option<DateTime<Utc>>,
}

impl ControlDirective {
    pub fn new(control_type: ControlType) -> Self {
        Self {
            control_type,
            arguments: None,
            enforce_at: None,
        }
    }

    #[must_use]
    pub fn with_enforce_at(mut self, enforce_at: DateTime<Utc>) -> Self {
        self.enforce_at = Some(enforce_at);
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: JsonObject) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// String argument lookup.
    #[must_use]
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.as_ref()?.get(key)?.as_str()
    }
}

/// Liveness / handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAck {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The six message variants, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Invoke(Invoke),
    Response(Response),
    Event(Event),
    Error(ErrorMessage),
    Control(ControlDirective),
    HandshakeAck(HandshakeAck),
}

/// Discriminant of a `MessageBody`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Invoke,
    Response,
    Event,
    Error,
    Control,
    HandshakeAck,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Invoke => "invoke",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
            MessageKind::Error => "error",
            MessageKind::Control => "control",
            MessageKind::HandshakeAck => "handshake_ack",
        }
    }

    /// Parse a wire `kind` tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "invoke" => Some(MessageKind::Invoke),
            "response" => Some(MessageKind::Response),
            "event" => Some(MessageKind::Event),
            "error" => Some(MessageKind::Error),
            "control" => Some(MessageKind::Control),
            "handshake_ack" => Some(MessageKind::HandshakeAck),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MessageBody {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Invoke(_) => MessageKind::Invoke,
            MessageBody::Response(_) => MessageKind::Response,
            MessageBody::Event(_) => MessageKind::Event,
            MessageBody::Error(_) => MessageKind::Error,
            MessageBody::Control(_) => MessageKind::Control,
            MessageBody::HandshakeAck(_) => MessageKind::HandshakeAck,
        }
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Wrapper around all PAP messages.
///
/// Immutable once validated; the engine only ever borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Globally unique, caller-generated.
    pub message_id: String,
    /// Causal predecessor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Groups a request with its response or stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub sender: AgentIdentity,
    pub auth: AuthContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    pub body: MessageBody,
    /// 32 lowercase hex chars when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// 16 lowercase hex chars when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl Envelope {
    /// Create an envelope with a fresh UUID `message_id` and `sent_at = now`.
    pub fn new(sender: AgentIdentity, auth: AuthContext, body: MessageBody) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            parent_id: None,
            correlation_id: None,
            sent_at: Utc::now(),
            sender,
            auth,
            annotations: None,
            body,
            trace_id: None,
            span_id: None,
        }
    }

    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = sent_at;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Key under which this envelope's exchange is tracked.
    ///
    /// The explicit `correlation_id`, or the `message_id` when absent.
    #[must_use]
    pub fn correlation_key(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(&self.message_id)
    }
}
