//! # Envelope Engine Service
//!
//! Application service implementing `EnvelopeProcessingApi`.
//!
//! ## Architecture
//!
//! This is the hexagonal "application service" that:
//! - Implements the inbound port (`EnvelopeProcessingApi`)
//! - Uses the outbound ports (clock, key registry, directory, delivery)
//! - Delegates each pipeline stage to the domain layer
//! - Publishes engine notifications on the event bus

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pap_bus::{EngineEvent, EventPublisher, RetirementReason};
use pap_telemetry::{metric_inc, TraceContext, ENVELOPES_RECEIVED, ENVELOPES_REJECTED};
use pap_types::{
    decode_envelope, ControlDirective, ControlType, Envelope, ErrorCode, ErrorMessage,
    HandshakeAck, Invoke, MessageBody, MessageKind, PapError, Response,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use crate::domain::auth::AuthVerifier;
use crate::domain::config::{add, ConfigError, EngineConfig};
use crate::domain::control::{directive_from, ControlScheduler};
use crate::domain::correlation::{CorrelationTracker, ExchangeKind, MatchResult};
use crate::domain::dispatch::Dispatcher;
use crate::domain::errors::CorrelationError;
use crate::domain::outcome::{Disposition, Outcome, Rejection, SweepReport, Warning, WarningKind};
use crate::domain::replay::ReplayGuard;
use crate::domain::streaming::{ChunkStream, StreamAssembler};
use crate::domain::validator::EnvelopeValidator;
use crate::ports::inbound::EnvelopeProcessingApi;
use crate::ports::outbound::{AgentDirectory, Clock, DirectiveDelivery, KeyRegistry};

/// `force_kill` argument naming the exchange to cancel.
pub const FORCE_KILL_CORRELATION_ARG: &str = "correlationId";

/// Collaborators the engine is wired to.
#[derive(Clone)]
pub struct EngineDeps {
    pub clock: Arc<dyn Clock>,
    pub keys: Arc<dyn KeyRegistry>,
    pub directory: Arc<dyn AgentDirectory>,
    pub delivery: Arc<dyn DirectiveDelivery>,
    pub publisher: Arc<dyn EventPublisher>,
}

/// The envelope validation and dispatch engine.
pub struct EnvelopeEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn EventPublisher>,
    replay: Arc<ReplayGuard>,
    validator: EnvelopeValidator,
    dispatcher: Dispatcher,
    tracker: CorrelationTracker,
    streams: Arc<StreamAssembler>,
    scheduler: ControlScheduler,
    last_housekeeping: Mutex<Option<DateTime<Utc>>>,
}

impl EnvelopeEngine {
    /// Wire an engine. Fails if `config` does not validate.
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Result<Self, ConfigError> {
        config.validate()?;

        let replay = Arc::new(ReplayGuard::new(
            config.replay_window,
            config.replay_gc_interval,
            config.max_replay_entries,
        ));
        let verifier = AuthVerifier::new(config.clone(), deps.keys, Arc::clone(&replay));
        let streams = Arc::new(StreamAssembler::new(config.tombstone_ttl));
        let tracker = CorrelationTracker::new(
            Arc::clone(&streams),
            Arc::clone(&deps.publisher),
            Arc::clone(&deps.clock),
            config.tombstone_ttl,
        );
        let scheduler = ControlScheduler::new(
            deps.delivery,
            Arc::clone(&deps.publisher),
            Arc::clone(&deps.clock),
            config.tombstone_ttl,
        );

        info!(
            max_clock_skew_secs = config.max_clock_skew.as_secs(),
            replay_window_secs = config.replay_window.as_secs(),
            algorithms = ?config.supported_algorithms,
            "Envelope engine ready"
        );

        Ok(Self {
            validator: EnvelopeValidator::new(verifier),
            dispatcher: Dispatcher::new(deps.directory),
            clock: deps.clock,
            publisher: deps.publisher,
            config,
            replay,
            tracker,
            streams,
            scheduler,
            last_housekeeping: Mutex::new(None),
        })
    }

    /// Evict expired tombstones, finished streams and settled directives
    /// at most once per `housekeeping_interval`.
    fn maybe_housekeep(&self, now: DateTime<Utc>) {
        {
            let mut last = self.last_housekeeping.lock();
            match *last {
                Some(at) if add(at, self.config.housekeeping_interval) > now => return,
                _ => *last = Some(now),
            }
        }
        let evicted = self.evict(now);
        if evicted > 0 {
            debug!(evicted, "Housekeeping evicted settled state");
        }
    }

    fn evict(&self, now: DateTime<Utc>) -> usize {
        self.tracker.evict_tombstones(now)
            + self.streams.evict(now)
            + self.scheduler.evict_settled(now)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn pending_exchanges(&self) -> usize {
        self.tracker.pending_count()
    }

    #[must_use]
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.tracker.is_pending(correlation_id)
    }

    #[must_use]
    pub fn pending_directives(&self) -> usize {
        self.scheduler.pending_count()
    }

    #[must_use]
    pub fn remembered_nonces(&self) -> usize {
        self.replay.len()
    }

    async fn process_inner(&self, envelope: Envelope) -> Result<Outcome, Rejection> {
        let kind = envelope.kind();
        let message_id = envelope.message_id.clone();
        metric_inc!(ENVELOPES_RECEIVED, &[kind.as_str()]);

        let now = self.clock.now();
        self.maybe_housekeep(now);
        let result = match self.validator.validate(envelope, now) {
            Ok(valid) => self.route(valid.into_envelope(), now).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(outcome) => {
                debug!(
                    message_id = %message_id,
                    correlation_id = %outcome.correlation_id,
                    warnings = outcome.warnings.len(),
                    "Envelope accepted"
                );
                Ok(outcome)
            }
            Err(error) => {
                metric_inc!(ENVELOPES_REJECTED, &[error.code.as_str()]);
                warn!(
                    message_id = %message_id,
                    kind = %kind,
                    code = %error.code,
                    error = %error.message,
                    "Envelope rejected"
                );
                Err(error.into())
            }
        }
    }

    async fn route(&self, envelope: Envelope, now: DateTime<Utc>) -> Result<Outcome, PapError> {
        let mut warnings = Vec::new();
        let (correlation_id, disposition) = match &envelope.body {
            MessageBody::Invoke(invoke) => {
                let key = envelope.correlation_key().to_string();
                let disposition = self.handle_invoke(&envelope, invoke, &key, now)?;
                (key, disposition)
            }
            MessageBody::Response(response) => {
                let key = reply_key(&envelope);
                let disposition = self
                    .handle_response(&key, response, now, &mut warnings)
                    .await?;
                (key, disposition)
            }
            MessageBody::Error(error) => {
                let key = reply_key(&envelope);
                let disposition = self.handle_error(&key, error, now, &mut warnings).await?;
                (key, disposition)
            }
            MessageBody::HandshakeAck(ack) => {
                let key = reply_key(&envelope);
                let disposition = self.handle_ack(&key, ack, now, &mut warnings).await?;
                (key, disposition)
            }
            MessageBody::Control(control) => {
                let key = envelope.correlation_key().to_string();
                let disposition = self.handle_control(&envelope, control, &key, now).await?;
                (key, disposition)
            }
            MessageBody::Event(event) => (
                envelope.correlation_key().to_string(),
                Disposition::EventAccepted {
                    event_type: event.event_type,
                },
            ),
        };

        Ok(Outcome {
            message_id: envelope.message_id.clone(),
            correlation_id,
            kind: envelope.kind(),
            disposition,
            warnings,
        })
    }

    // =========================================================================
    // PER-KIND HANDLING
    // =========================================================================

    fn handle_invoke(
        &self,
        envelope: &Envelope,
        invoke: &Invoke,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Disposition, PapError> {
        let destination = self.dispatcher.resolve(invoke, now)?;
        let awaiting_reply = invoke.expects_reply();

        let deadline = if awaiting_reply {
            let deadline = invoke
                .deadline
                .unwrap_or_else(|| add(now, self.config.default_exchange_ttl));
            self.tracker.register(
                correlation_id,
                envelope.sender.clone(),
                ExchangeKind::Invoke,
                deadline,
            )?;
            self.streams.open(correlation_id);
            Some(deadline)
        } else {
            None
        };

        info!(
            correlation_id,
            sender = %envelope.sender,
            target = %destination.agent,
            method = %invoke.method,
            awaiting_reply,
            "Invoke dispatched"
        );
        Ok(Disposition::Dispatched {
            destination,
            awaiting_reply,
            deadline,
        })
    }

    async fn handle_response(
        &self,
        correlation_id: &str,
        response: &Response,
        now: DateTime<Utc>,
        warnings: &mut Vec<Warning>,
    ) -> Result<Disposition, PapError> {
        let is_final = response.is_final();
        let terminal = is_final.then_some(RetirementReason::Final);

        match self.tracker.match_reply(correlation_id, terminal).await {
            Ok(MatchResult::Continued | MatchResult::Retired(_)) => {
                let appended = self
                    .streams
                    .append(correlation_id, response.chunks(), is_final, now)?;
                Ok(Disposition::ResponseMatched {
                    chunks: appended.appended,
                    retired: appended.finished,
                })
            }
            Ok(MatchResult::Orphaned) => {
                self.orphaned(correlation_id, MessageKind::Response, warnings)
                    .await;
                Ok(Disposition::Orphaned)
            }
            Err(CorrelationError::AlreadyRetired(_)) if is_final => {
                self.duplicate_terminal(correlation_id, warnings).await;
                Ok(Disposition::DuplicateTerminal)
            }
            // A non-final chunk after the exchange ended.
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_error(
        &self,
        correlation_id: &str,
        error: &ErrorMessage,
        now: DateTime<Utc>,
        warnings: &mut Vec<Warning>,
    ) -> Result<Disposition, PapError> {
        match self
            .tracker
            .match_reply(correlation_id, Some(RetirementReason::Error))
            .await
        {
            Ok(MatchResult::Retired(_) | MatchResult::Continued) => {
                self.streams
                    .abort(correlation_id, PapError::from(error), now);
                Ok(Disposition::ErrorMatched { code: error.code })
            }
            Ok(MatchResult::Orphaned) => {
                self.orphaned(correlation_id, MessageKind::Error, warnings)
                    .await;
                Ok(Disposition::Orphaned)
            }
            Err(CorrelationError::AlreadyRetired(_)) => {
                self.duplicate_terminal(correlation_id, warnings).await;
                Ok(Disposition::DuplicateTerminal)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_ack(
        &self,
        correlation_id: &str,
        ack: &HandshakeAck,
        now: DateTime<Utc>,
        warnings: &mut Vec<Warning>,
    ) -> Result<Disposition, PapError> {
        match self
            .tracker
            .match_reply(correlation_id, Some(RetirementReason::Acknowledged))
            .await
        {
            Ok(MatchResult::Retired(_) | MatchResult::Continued) => {
                self.streams.close(correlation_id, now);
                Ok(Disposition::HandshakeAcked {
                    accepted: ack.accepted,
                })
            }
            Ok(MatchResult::Orphaned) => {
                self.orphaned(correlation_id, MessageKind::HandshakeAck, warnings)
                    .await;
                Ok(Disposition::Orphaned)
            }
            Err(CorrelationError::AlreadyRetired(_)) => {
                self.duplicate_terminal(correlation_id, warnings).await;
                Ok(Disposition::DuplicateTerminal)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_control(
        &self,
        envelope: &Envelope,
        control: &ControlDirective,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Disposition, PapError> {
        let is_ping = control.control_type == ControlType::Ping;
        if is_ping {
            let start = control.enforce_at.filter(|at| *at > now).unwrap_or(now);
            self.tracker.register(
                correlation_id,
                envelope.sender.clone(),
                ExchangeKind::Ping,
                add(start, self.config.ping_timeout),
            )?;
        }

        let directive = directive_from(envelope, control, now);
        let handle = match self.scheduler.schedule(directive, now).await {
            Ok(handle) => handle,
            Err(e) => {
                if is_ping {
                    self.tracker.cancel(correlation_id).await;
                }
                return Err(e);
            }
        };

        // The target exchange is only dropped once the kill is accepted
        let mut cancelled_exchange = None;
        if control.control_type == ControlType::ForceKill {
            if let Some(target) = control.argument_str(FORCE_KILL_CORRELATION_ARG) {
                if self.tracker.cancel(target).await {
                    cancelled_exchange = Some(target.to_string());
                }
            }
        }

        Ok(Disposition::DirectiveScheduled {
            released: handle.is_released(),
            handle,
            cancelled_exchange,
        })
    }

    // =========================================================================
    // WARNINGS
    // =========================================================================

    async fn orphaned(&self, correlation_id: &str, kind: MessageKind, warnings: &mut Vec<Warning>) {
        warn!(correlation_id, kind = %kind, "Orphaned reply");
        warnings.push(Warning {
            kind: WarningKind::Orphaned,
            code: ErrorCode::NotFound,
            message: format!("No exchange pending for {correlation_id}"),
        });
        self.publisher
            .publish(EngineEvent::OrphanedReply {
                correlation_id: correlation_id.to_string(),
                kind,
            })
            .await;
    }

    async fn duplicate_terminal(&self, correlation_id: &str, warnings: &mut Vec<Warning>) {
        warn!(correlation_id, "Duplicate terminal reply");
        warnings.push(Warning {
            kind: WarningKind::DuplicateTerminal,
            code: ErrorCode::Conflict,
            message: format!("Exchange {correlation_id} already retired"),
        });
        self.publisher
            .publish(EngineEvent::DuplicateTerminal {
                correlation_id: correlation_id.to_string(),
            })
            .await;
    }
}

/// Correlation a reply names: `correlationId`, else `parentId`, else its own id.
fn reply_key(envelope: &Envelope) -> String {
    envelope
        .correlation_id
        .as_deref()
        .or(envelope.parent_id.as_deref())
        .unwrap_or(&envelope.message_id)
        .to_string()
}

#[async_trait]
impl EnvelopeProcessingApi for EnvelopeEngine {
    async fn process(&self, envelope: Envelope) -> Result<Outcome, Rejection> {
        let span = TraceContext::from_envelope_ids(
            envelope.trace_id.as_deref(),
            envelope.span_id.as_deref(),
        )
        .envelope_span(&envelope.message_id, envelope.kind().as_str());
        self.process_inner(envelope).instrument(span).await
    }

    async fn process_wire(&self, bytes: &[u8]) -> Result<Outcome, Rejection> {
        match decode_envelope(bytes) {
            Ok(envelope) => self.process(envelope).await,
            Err(e) => {
                let error = PapError::from(e);
                metric_inc!(ENVELOPES_REJECTED, &[error.code.as_str()]);
                warn!(error = %error.message, "Undecodable envelope rejected");
                Err(error.into())
            }
        }
    }

    fn take_stream(&self, correlation_id: &str) -> Option<ChunkStream> {
        self.streams.take_stream(correlation_id)
    }

    async fn cancel(&self, correlation_id: &str) -> Result<(), PapError> {
        if self.tracker.cancel(correlation_id).await {
            Ok(())
        } else {
            Err(CorrelationError::NotPending(correlation_id.to_string()).into())
        }
    }

    fn cancel_directive(&self, message_id: &str) -> Result<(), PapError> {
        self.scheduler.cancel(message_id).map_err(PapError::from)
    }

    async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let report = SweepReport {
            replay_purged: self.replay.purge_expired(now),
            timed_out: self.tracker.sweep_expired(now).await.len(),
            released: self.scheduler.release_due(now).await.len(),
            evicted: self.evict(now),
        };
        debug!(?report, "Sweep complete");
        report
    }
}
