//! # Control Scheduler
//!
//! Holds control directives until `enforceAt` and releases each exactly
//! once to the delivery collaborator. The scheduler owns timing only; the
//! target agent applies the effect.
//!
//! ## Directive States
//!
//! ```text
//! PENDING ──release──► RELEASED
//!    └─────cancel────► CANCELLED   (never for force_kill)
//! ```
//!
//! Both transitions are a single compare-and-swap, so a timer firing and a
//! cancel racing each other cannot both win.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pap_bus::{EngineEvent, EventPublisher, ReleasedDirective};
use pap_telemetry::{metric_inc, DIRECTIVES_RELEASED};
use pap_types::{ControlDirective, ControlType, Envelope, PapError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{add, until};
use super::errors::ControlError;
use crate::ports::outbound::{Clock, DirectiveDelivery};

const PENDING: u8 = 0;
const RELEASED: u8 = 1;
const CANCELLED: u8 = 2;

/// Build the directive the target will receive from a `control` envelope.
///
/// `force_kill` is marked non-cancelable and bypasses the grace period.
pub fn directive_from(
    envelope: &Envelope,
    control: &ControlDirective,
    now: DateTime<Utc>,
) -> ReleasedDirective {
    let force = control.control_type == ControlType::ForceKill;
    ReleasedDirective {
        control_type: control.control_type,
        arguments: control.arguments.clone(),
        message_id: envelope.message_id.clone(),
        correlation_id: envelope.correlation_key().to_string(),
        requester: envelope.sender.clone(),
        enforce_at: control.enforce_at,
        released_at: now,
        cancelable: !force,
        bypass_grace_period: force,
    }
}

struct DirectiveSlot {
    directive: Mutex<ReleasedDirective>,
    state: AtomicU8,
    timer: Mutex<Option<JoinHandle<()>>>,
    settled_at: Mutex<Option<DateTime<Utc>>>,
}

impl DirectiveSlot {
    fn settle(&self, now: DateTime<Utc>) {
        *self.settled_at.lock() = Some(now);
    }

    fn abort_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }
}

struct SchedulerState {
    slots: DashMap<String, Arc<DirectiveSlot>>,
    delivery: Arc<dyn DirectiveDelivery>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl SchedulerState {
    /// Release `slot` if it is still pending. `Ok(None)` if someone else
    /// already released or cancelled it.
    async fn release(&self, slot: &DirectiveSlot) -> Result<Option<ReleasedDirective>, PapError> {
        if slot
            .state
            .compare_exchange(PENDING, RELEASED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        let now = self.clock.now();
        slot.settle(now);
        let directive = {
            let mut directive = slot.directive.lock();
            directive.released_at = now;
            directive.clone()
        };

        self.delivery.deliver(directive.clone()).await?;
        metric_inc!(DIRECTIVES_RELEASED, &[directive.control_type.as_str()]);
        info!(
            message_id = %directive.message_id,
            control_type = %directive.control_type,
            target_requester = %directive.requester,
            "Directive released"
        );
        self.publisher
            .publish(EngineEvent::DirectiveReleased {
                directive: directive.clone(),
            })
            .await;
        Ok(Some(directive))
    }

    async fn fire(self: Arc<Self>, message_id: String) {
        let Some(slot) = self.slots.get(&message_id).map(|s| Arc::clone(&*s)) else {
            return;
        };
        if let Err(e) = self.release(&slot).await {
            warn!(message_id = %message_id, error = %e, "Scheduled directive delivery failed");
        }
    }
}

/// Caller's handle on a scheduled directive.
#[derive(Clone)]
pub struct DirectiveHandle {
    message_id: String,
    slot: Arc<DirectiveSlot>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DirectiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveHandle")
            .field("message_id", &self.message_id)
            .field("state", &self.slot.state.load(Ordering::Acquire))
            .finish()
    }
}

impl DirectiveHandle {
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.slot.state.load(Ordering::Acquire) == RELEASED
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot.state.load(Ordering::Acquire) == CANCELLED
    }

    #[must_use]
    pub fn cancelable(&self) -> bool {
        self.slot.directive.lock().cancelable
    }

    /// Snapshot of the directive as it was (or will be) released.
    #[must_use]
    pub fn directive(&self) -> ReleasedDirective {
        self.slot.directive.lock().clone()
    }

    /// Withdraw the directive before release.
    ///
    /// `FORBIDDEN` for non-cancelable directives, `CONFLICT` once released.
    pub fn cancel(&self) -> Result<(), ControlError> {
        cancel_slot(&self.message_id, &self.slot, self.clock.now())
    }
}

fn cancel_slot(message_id: &str, slot: &DirectiveSlot, now: DateTime<Utc>) -> Result<(), ControlError> {
    if !slot.directive.lock().cancelable {
        return Err(ControlError::NotCancelable(message_id.to_string()));
    }
    match slot
        .state
        .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
    {
        Ok(_) => {
            slot.abort_timer();
            slot.settle(now);
            info!(message_id, "Directive cancelled");
            Ok(())
        }
        Err(RELEASED) => Err(ControlError::AlreadyReleased(message_id.to_string())),
        Err(_) => Err(ControlError::AlreadyCancelled(message_id.to_string())),
    }
}

pub struct ControlScheduler {
    state: Arc<SchedulerState>,
    retention: Duration,
}

impl ControlScheduler {
    /// `retention` bounds how long settled directives stay addressable.
    pub fn new(
        delivery: Arc<dyn DirectiveDelivery>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        retention: Duration,
    ) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                slots: DashMap::new(),
                delivery,
                publisher,
                clock,
            }),
            retention,
        }
    }

    /// Release now if `enforce_at` is absent or past, otherwise arm a timer.
    ///
    /// A delivery failure on immediate release is returned to the caller.
    pub async fn schedule(
        &self,
        directive: ReleasedDirective,
        now: DateTime<Utc>,
    ) -> Result<DirectiveHandle, PapError> {
        use dashmap::mapref::entry::Entry;

        let message_id = directive.message_id.clone();
        let due_in = directive
            .enforce_at
            .map(|at| until(now, at))
            .filter(|delay| !delay.is_zero());

        let slot = Arc::new(DirectiveSlot {
            directive: Mutex::new(directive),
            state: AtomicU8::new(PENDING),
            timer: Mutex::new(None),
            settled_at: Mutex::new(None),
        });

        match self.state.slots.entry(message_id.clone()) {
            Entry::Occupied(_) => return Err(ControlError::AlreadyScheduled(message_id).into()),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&slot));
            }
        }

        let handle = DirectiveHandle {
            message_id: message_id.clone(),
            slot: Arc::clone(&slot),
            clock: Arc::clone(&self.state.clock),
        };

        match due_in {
            None => {
                if let Err(e) = self.state.release(&slot).await {
                    self.state.slots.remove(&message_id);
                    return Err(e);
                }
            }
            Some(delay) => {
                if let Ok(runtime) = Handle::try_current() {
                    let state = Arc::clone(&self.state);
                    let id = message_id.clone();
                    *slot.timer.lock() = Some(runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        state.fire(id).await;
                    }));
                }
                debug!(message_id = %message_id, delay_ms = delay.as_millis() as u64, "Directive held");
            }
        }
        Ok(handle)
    }

    /// Cancel by control envelope id.
    pub fn cancel(&self, message_id: &str) -> Result<(), ControlError> {
        let slot = self
            .state
            .slots
            .get(message_id)
            .map(|s| Arc::clone(&*s))
            .ok_or_else(|| ControlError::NotFound(message_id.to_string()))?;
        cancel_slot(message_id, &slot, self.state.clock.now())
    }

    /// Release every pending directive whose `enforce_at` has passed.
    pub async fn release_due(&self, now: DateTime<Utc>) -> Vec<ReleasedDirective> {
        let due: Vec<Arc<DirectiveSlot>> = self
            .state
            .slots
            .iter()
            .filter(|entry| {
                let slot = entry.value();
                slot.state.load(Ordering::Acquire) == PENDING
                    && slot.directive.lock().enforce_at.map_or(true, |at| at <= now)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut released = Vec::with_capacity(due.len());
        for slot in due {
            slot.abort_timer();
            match self.state.release(&slot).await {
                Ok(Some(directive)) => released.push(directive),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Due directive delivery failed"),
            }
        }
        released
    }

    /// Forget settled directives older than the retention period.
    pub fn evict_settled(&self, now: DateTime<Utc>) -> usize {
        let before = self.state.slots.len();
        let retention = self.retention;
        self.state.slots.retain(|_, slot| match *slot.settled_at.lock() {
            Some(at) => add(at, retention) > now,
            None => true,
        });
        before.saturating_sub(self.state.slots.len())
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state
            .slots
            .iter()
            .filter(|entry| entry.value().state.load(Ordering::Acquire) == PENDING)
            .count()
    }
}
