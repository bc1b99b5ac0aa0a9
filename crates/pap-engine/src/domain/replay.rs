//! # Replay Guard
//!
//! Remembers `(agent, nonce)` pairs until `issuedAt + replay_window`,
//! inclusive. Because the window is never shorter than the clock skew and
//! the freshness check also accepts an age of exactly `skew`, a nonce is
//! still remembered for as long as its envelope could pass that check.
//!
//! Expired entries are purged opportunistically on insert, at most once per
//! `gc_interval`, or immediately when the table grows past `max_entries`.
//! Same pending-buffer-with-gc shape as an assembler buffer: a concurrent
//! map plus a last-swept timestamp.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pap_telemetry::{metric_inc, REPLAYS_DETECTED};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::add;

type NonceKey = (String, String);

pub struct ReplayGuard {
    seen: DashMap<NonceKey, DateTime<Utc>>,
    window: Duration,
    gc_interval: Duration,
    max_entries: usize,
    last_gc: Mutex<Option<DateTime<Utc>>>,
}

impl ReplayGuard {
    #[must_use]
    pub fn new(window: Duration, gc_interval: Duration, max_entries: usize) -> Self {
        Self {
            seen: DashMap::new(),
            window,
            gc_interval,
            max_entries,
            last_gc: Mutex::new(None),
        }
    }

    /// Record the nonce, or report a replay.
    ///
    /// Returns `false` if `(agent, nonce)` is already remembered and not yet
    /// expired at `now`. Atomic per key: of two concurrent callers with the
    /// same pair, exactly one gets `true`.
    pub fn check_and_record(
        &self,
        agent: &str,
        nonce: &str,
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let expiry = add(issued_at, self.window);
        let fresh = match self.seen.entry((agent.to_string(), nonce.to_string())) {
            Entry::Occupied(mut existing) => {
                if *existing.get() >= now {
                    false
                } else {
                    existing.insert(expiry);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(expiry);
                true
            }
        };

        if fresh {
            self.maybe_gc(now);
        } else {
            metric_inc!(REPLAYS_DETECTED);
            warn!(agent, nonce, "Replayed nonce rejected");
        }
        fresh
    }

    /// Whether the pair is remembered and unexpired at `at`.
    #[must_use]
    pub fn seen(&self, agent: &str, nonce: &str, at: DateTime<Utc>) -> bool {
        self.seen
            .get(&(agent.to_string(), nonce.to_string()))
            .is_some_and(|expiry| *expiry >= at)
    }

    /// Remember a pair until `expiry` regardless of prior state.
    pub fn record(&self, agent: &str, nonce: &str, expiry: DateTime<Utc>) {
        self.seen.insert((agent.to_string(), nonce.to_string()), expiry);
    }

    /// Drop every entry whose expiry is strictly before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expiry| *expiry >= now);
        *self.last_gc.lock() = Some(now);
        let purged = before.saturating_sub(self.seen.len());
        if purged > 0 {
            debug!(purged, remaining = self.seen.len(), "Replay guard purged");
        }
        purged
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn maybe_gc(&self, now: DateTime<Utc>) {
        let over_capacity = self.seen.len() > self.max_entries;
        let due = match *self.last_gc.lock() {
            None => true,
            Some(last) => add(last, self.gc_interval) <= now,
        };
        if over_capacity || due {
            self.purge_expired(now);
        }
    }
}
