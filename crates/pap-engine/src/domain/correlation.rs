//! # Correlation Tracker
//!
//! Tracks exchanges that expect a reply, keyed by correlation id.
//!
//! ## Lifecycle
//!
//! ```text
//! register ──► Pending ──┬── final response / error / ack ──► Retired
//!                        ├── deadline timer fires ──────────► Retired (TIMEOUT synthesized)
//!                        └── cancel / force_kill ───────────► Retired (silent)
//! ```
//!
//! Each correlation has exactly one slot. Every transition out of
//! `Pending` happens under that slot's map lock, so exactly one retirement
//! wins. Retired slots are kept until `tombstone_ttl` so a second terminal
//! reply is reported as a duplicate (`CONFLICT`) instead of an orphan.
//!
//! Deadlines fire from a per-exchange tokio timer. Without a runtime, or as
//! a backstop, `sweep_expired` retires overdue exchanges against the clock.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pap_bus::{EngineEvent, EventPublisher, RetirementReason};
use pap_telemetry::{metric_inc, CORRELATIONS_PENDING, CORRELATION_RETIREMENTS};
use pap_types::{AgentIdentity, ErrorCode, ErrorPayload, PapError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::{add, until};
use super::errors::CorrelationError;
use super::streaming::StreamAssembler;
use crate::ports::outbound::Clock;

/// What opened the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// `invoke` with `expectReply`.
    Invoke,
    /// `control` ping awaiting a `handshake_ack`.
    Ping,
}

/// Result of matching a reply against the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Non-terminal reply for a pending exchange.
    Continued,
    /// Terminal reply; the exchange is now retired.
    Retired(RetirementReason),
    /// The correlation id was never registered (or long forgotten).
    Orphaned,
}

/// A timeout retirement.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedOut {
    pub correlation_id: String,
    pub requester: AgentIdentity,
    pub error: ErrorPayload,
}

#[derive(Debug)]
struct PendingExchange {
    requester: AgentIdentity,
    kind: ExchangeKind,
    deadline: DateTime<Utc>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
enum Slot {
    Pending(PendingExchange),
    Retired {
        reason: RetirementReason,
        evict_at: DateTime<Utc>,
    },
}

/// State shared with the deadline timers.
struct TrackerState {
    slots: DashMap<String, Slot>,
    streams: Arc<StreamAssembler>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    tombstone_ttl: Duration,
    next_generation: AtomicU64,
}

impl TrackerState {
    /// Move `Pending` to `Retired` if the slot is pending and `accept` agrees.
    fn transition(
        &self,
        correlation_id: &str,
        reason: RetirementReason,
        now: DateTime<Utc>,
        accept: impl FnOnce(&PendingExchange) -> bool,
    ) -> Option<PendingExchange> {
        let mut slot = self.slots.get_mut(correlation_id)?;
        match &*slot {
            Slot::Pending(exchange) if accept(exchange) => {}
            _ => return None,
        }
        let retired = Slot::Retired {
            reason,
            evict_at: add(now, self.tombstone_ttl),
        };
        match std::mem::replace(&mut *slot, retired) {
            Slot::Pending(exchange) => {
                CORRELATIONS_PENDING.dec();
                metric_inc!(CORRELATION_RETIREMENTS, &[reason.as_str()]);
                Some(exchange)
            }
            Slot::Retired { .. } => None,
        }
    }

    async fn announce_timeout(&self, correlation_id: String, exchange: PendingExchange) -> TimedOut {
        let now = self.clock.now();
        let error = PapError::new(
            ErrorCode::Timeout,
            format!("No terminal reply for {correlation_id} before {}", exchange.deadline),
        );
        self.streams.abort(&correlation_id, error.clone(), now);

        info!(
            correlation_id = %correlation_id,
            requester = %exchange.requester,
            deadline = %exchange.deadline,
            "Exchange timed out"
        );

        let timed_out = TimedOut {
            correlation_id,
            requester: exchange.requester,
            error: error.to_error_payload(),
        };
        self.publisher
            .publish(EngineEvent::ExchangeTimedOut {
                correlation_id: timed_out.correlation_id.clone(),
                requester: timed_out.requester.clone(),
                error: timed_out.error.clone(),
            })
            .await;
        self.publisher
            .publish(EngineEvent::ExchangeRetired {
                correlation_id: timed_out.correlation_id.clone(),
                reason: RetirementReason::Timeout,
            })
            .await;
        timed_out
    }

    /// Timer path: the task that owns this call is the exchange's timer.
    async fn expire(self: Arc<Self>, correlation_id: String, generation: u64) {
        let now = self.clock.now();
        let exchange = self.transition(&correlation_id, RetirementReason::Timeout, now, |ex| {
            ex.generation == generation
        });
        if let Some(exchange) = exchange {
            self.announce_timeout(correlation_id, exchange).await;
        }
    }
}

pub struct CorrelationTracker {
    state: Arc<TrackerState>,
}

impl CorrelationTracker {
    pub fn new(
        streams: Arc<StreamAssembler>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        tombstone_ttl: Duration,
    ) -> Self {
        Self {
            state: Arc::new(TrackerState {
                slots: DashMap::new(),
                streams,
                publisher,
                clock,
                tombstone_ttl,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Open an exchange that retires at `deadline` unless answered first.
    ///
    /// Fails with `CONFLICT` if the id is pending or recently retired.
    pub fn register(
        &self,
        correlation_id: &str,
        requester: AgentIdentity,
        kind: ExchangeKind,
        deadline: DateTime<Utc>,
    ) -> Result<(), CorrelationError> {
        use dashmap::mapref::entry::Entry;

        let generation = self.state.next_generation.fetch_add(1, Ordering::Relaxed);
        match self.state.slots.entry(correlation_id.to_string()) {
            Entry::Occupied(_) => Err(CorrelationError::DuplicateExchange(
                correlation_id.to_string(),
            )),
            Entry::Vacant(slot) => {
                let timer = self.spawn_timer(correlation_id, generation, deadline);
                slot.insert(Slot::Pending(PendingExchange {
                    requester,
                    kind,
                    deadline,
                    generation,
                    timer,
                }));
                CORRELATIONS_PENDING.inc();
                debug!(correlation_id, ?kind, %deadline, "Exchange registered");
                Ok(())
            }
        }
    }

    fn spawn_timer(
        &self,
        correlation_id: &str,
        generation: u64,
        deadline: DateTime<Utc>,
    ) -> Option<JoinHandle<()>> {
        let handle = Handle::try_current().ok()?;
        let delay = until(self.state.clock.now(), deadline);
        let state = Arc::clone(&self.state);
        let correlation_id = correlation_id.to_string();
        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            state.expire(correlation_id, generation).await;
        }))
    }

    /// Match a reply. `terminal` is the retirement reason when the reply
    /// ends the exchange, `None` for an intermediate chunk.
    pub async fn match_reply(
        &self,
        correlation_id: &str,
        terminal: Option<RetirementReason>,
    ) -> Result<MatchResult, CorrelationError> {
        let Some(reason) = terminal else {
            return match self.state.slots.get(correlation_id).as_deref() {
                Some(Slot::Pending(_)) => Ok(MatchResult::Continued),
                Some(Slot::Retired { .. }) => Err(CorrelationError::AlreadyRetired(
                    correlation_id.to_string(),
                )),
                None => Ok(MatchResult::Orphaned),
            };
        };

        let now = self.state.clock.now();
        if self.retire(correlation_id, reason, now).await.is_some() {
            return Ok(MatchResult::Retired(reason));
        }
        if self.state.slots.contains_key(correlation_id) {
            Err(CorrelationError::AlreadyRetired(correlation_id.to_string()))
        } else {
            Ok(MatchResult::Orphaned)
        }
    }

    async fn retire(
        &self,
        correlation_id: &str,
        reason: RetirementReason,
        now: DateTime<Utc>,
    ) -> Option<ExchangeKind> {
        let exchange = self.state.transition(correlation_id, reason, now, |_| true)?;
        if let Some(timer) = &exchange.timer {
            timer.abort();
        }
        debug!(correlation_id, reason = reason.as_str(), "Exchange retired");
        self.state
            .publisher
            .publish(EngineEvent::ExchangeRetired {
                correlation_id: correlation_id.to_string(),
                reason,
            })
            .await;
        Some(exchange.kind)
    }

    /// Drop a pending exchange without synthesizing a timeout.
    ///
    /// Returns `false` if nothing was pending under that id.
    pub async fn cancel(&self, correlation_id: &str) -> bool {
        let now = self.state.clock.now();
        let cancelled = self
            .retire(correlation_id, RetirementReason::Cancelled, now)
            .await
            .is_some();
        if cancelled {
            self.state.streams.close(correlation_id, now);
            info!(correlation_id, "Exchange cancelled");
        }
        cancelled
    }

    /// Retire every exchange whose deadline is at or before `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<TimedOut> {
        let overdue: Vec<String> = self
            .state
            .slots
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Pending(exchange) if exchange.deadline <= now => Some(entry.key().clone()),
                _ => None,
            })
            .collect();

        let mut timed_out = Vec::with_capacity(overdue.len());
        for correlation_id in overdue {
            let exchange = self.state.transition(
                &correlation_id,
                RetirementReason::Timeout,
                now,
                |ex| ex.deadline <= now,
            );
            if let Some(exchange) = exchange {
                if let Some(timer) = &exchange.timer {
                    timer.abort();
                }
                timed_out.push(self.state.announce_timeout(correlation_id, exchange).await);
            }
        }
        timed_out
    }

    /// Forget retired ids whose tombstone has expired.
    pub fn evict_tombstones(&self, now: DateTime<Utc>) -> usize {
        let before = self.state.slots.len();
        self.state.slots.retain(|_, slot| match slot {
            Slot::Retired { evict_at, .. } => *evict_at > now,
            Slot::Pending(_) => true,
        });
        before.saturating_sub(self.state.slots.len())
    }

    #[must_use]
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        matches!(
            self.state.slots.get(correlation_id).as_deref(),
            Some(Slot::Pending(_))
        )
    }

    /// Why a correlation was retired, while its tombstone lasts.
    #[must_use]
    pub fn retirement(&self, correlation_id: &str) -> Option<RetirementReason> {
        match self.state.slots.get(correlation_id).as_deref() {
            Some(Slot::Retired { reason, .. }) => Some(*reason),
            _ => None,
        }
    }

    /// Requester of a pending exchange.
    #[must_use]
    pub fn requester(&self, correlation_id: &str) -> Option<AgentIdentity> {
        match self.state.slots.get(correlation_id).as_deref() {
            Some(Slot::Pending(exchange)) => Some(exchange.requester.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Pending(_)))
            .count()
    }
}
