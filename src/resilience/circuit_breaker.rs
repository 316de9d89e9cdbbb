//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and outcomes are counted
//! - Open: backend assumed down, calls fail fast without contacting it
//! - Half-Open: a limited number of trial calls probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: error rate >= threshold over the rolling window (with enough volume)
//! Closed → Open: force-trip (reroute tracker)
//! Open → Half-Open: after reset timeout
//! Half-Open → Closed: trial successes reach the success threshold
//! Half-Open → Open: any trial fails
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global)
//! - All state lives behind one mutex; it is never held across the backend call
//! - Each transition bumps a generation; calls admitted under an older generation
//!   still count in the statistics but cannot drive a transition
//! - Events are broadcast to subscribers, who only ever see copies

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::resilience::timeouts::with_deadline;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum BreakerState {
    #[default]
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF-OPEN")]
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "CLOSED",
            BreakerState::Open => "OPEN",
            BreakerState::HalfOpen => "HALF-OPEN",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened inside a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEventKind {
    Opened,
    HalfOpened,
    Closed,
    Failure,
    Success,
}

impl BreakerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerEventKind::Opened => "opened",
            BreakerEventKind::HalfOpened => "half_opened",
            BreakerEventKind::Closed => "closed",
            BreakerEventKind::Failure => "failure",
            BreakerEventKind::Success => "success",
        }
    }
}

/// Notification published to breaker subscribers.
#[derive(Debug, Clone)]
pub struct BreakerEvent {
    pub breaker: Arc<str>,
    pub kind: BreakerEventKind,
    /// State right after the event.
    pub state: BreakerState,
    pub at: SystemTime,
}

/// Why a call through the breaker did not produce a value.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Rejected without invoking the backend.
    #[error("circuit breaker is open")]
    Open,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker, as served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Milliseconds since the Unix epoch.
    pub last_state_change_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    start: Instant,
    successes: u32,
    failures: u32,
}

/// Outcome counts over the last `bucket_width * capacity`.
#[derive(Debug)]
struct RollingWindow {
    buckets: VecDeque<Bucket>,
    bucket_width: Duration,
    capacity: usize,
}

impl RollingWindow {
    fn new(window: Duration, buckets: u32) -> Self {
        let capacity = buckets.max(1) as usize;
        Self {
            buckets: VecDeque::with_capacity(capacity),
            bucket_width: (window / capacity as u32).max(Duration::from_millis(1)),
            capacity,
        }
    }

    fn span(&self) -> Duration {
        self.bucket_width * self.capacity as u32
    }

    fn expire(&mut self, now: Instant) {
        let span = self.span();
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.start) >= span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.expire(now);
        let needs_bucket = self
            .buckets
            .back()
            .map(|b| now.saturating_duration_since(b.start) >= self.bucket_width)
            .unwrap_or(true);
        if needs_bucket {
            self.buckets.push_back(Bucket {
                start: now,
                successes: 0,
                failures: 0,
            });
        }
        if let Some(bucket) = self.buckets.back_mut() {
            if success {
                bucket.successes += 1;
            } else {
                bucket.failures += 1;
            }
        }
    }

    /// (successes, failures)
    fn totals(&mut self, now: Instant) -> (u32, u32) {
        self.expire(now);
        self.buckets
            .iter()
            .fold((0, 0), |(s, f), b| (s + b.successes, f + b.failures))
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    generation: u64,
    opened_at: Option<Instant>,
    last_state_change: SystemTime,
    window: RollingWindow,
    trials_in_flight: u32,
    trial_successes: u32,
}

/// Per-backend circuit breaker.
pub struct CircuitBreaker {
    name: Arc<str>,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<BreakerEvent>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.lock().state)
            .finish()
    }
}

/// Permission to run one call, tied to the generation it was admitted under.
struct Ticket<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    completed: bool,
}

impl Ticket<'_> {
    fn complete(mut self, success: bool) {
        self.completed = true;
        self.breaker.complete(self.generation, self.trial, success);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        // Abandoned trial (caller dropped the future): free the slot, record nothing.
        if !self.completed && self.trial {
            let mut inner = self.breaker.lock();
            if inner.generation == self.generation {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
            }
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<Arc<str>>, config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let window = RollingWindow::new(config.rolling_window(), config.rolling_buckets);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                opened_at: None,
                last_state_change: SystemTime::now(),
                window,
                trials_in_flight: 0,
                trial_successes: 0,
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive every future event of this breaker.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Current state, applying a due Open → Half-Open transition first.
    pub fn state(&self) -> BreakerState {
        let mut events = Vec::new();
        let state = {
            let mut inner = self.lock();
            self.refresh(&mut inner, Instant::now(), &mut events);
            inner.state
        };
        self.publish(events);
        state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut events = Vec::new();
        let snapshot = {
            let mut inner = self.lock();
            let now = Instant::now();
            self.refresh(&mut inner, now, &mut events);
            let (success_count, failure_count) = inner.window.totals(now);
            BreakerSnapshot {
                state: inner.state,
                failure_count,
                success_count,
                last_state_change_ms: epoch_millis(inner.last_state_change),
            }
        };
        self.publish(events);
        snapshot
    }

    /// Run `invocation` under the breaker's admission rules and call deadline.
    ///
    /// In the open state the future is dropped without being polled.
    pub async fn call<F, T, E>(&self, invocation: F) -> Result<T, CallError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        let ticket = self.admit().ok_or(CallError::Open)?;
        let deadline = self.config.call_timeout();

        match with_deadline(deadline, invocation).await {
            Ok(Ok(value)) => {
                ticket.complete(true);
                Ok(value)
            }
            Ok(Err(err)) => {
                ticket.complete(false);
                Err(CallError::Inner(err))
            }
            Err(_) => {
                ticket.complete(false);
                Err(CallError::Timeout(deadline))
            }
        }
    }

    /// Trip the breaker from outside, bypassing the error-rate evaluation.
    ///
    /// Returns `false` if the breaker was already open.
    pub fn force_open(&self, reason: &str) -> bool {
        let mut events = Vec::new();
        let tripped = {
            let mut inner = self.lock();
            let now = Instant::now();
            self.refresh(&mut inner, now, &mut events);
            if inner.state == BreakerState::Open {
                false
            } else {
                tracing::warn!(service = %self.name, from = %inner.state, reason, "Circuit breaker force-tripped");
                self.transition(&mut inner, BreakerState::Open, now, &mut events);
                true
            }
        };
        self.publish(events);
        tripped
    }

    /// Return to closed with empty statistics.
    pub fn reset(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            tracing::info!(service = %self.name, from = %inner.state, "Circuit breaker manually reset");
            if inner.state == BreakerState::Closed {
                inner.window.clear();
            } else {
                self.transition(&mut inner, BreakerState::Closed, Instant::now(), &mut events);
            }
        }
        self.publish(events);
    }

    fn admit(&self) -> Option<Ticket<'_>> {
        let mut events = Vec::new();
        let admitted = {
            let mut inner = self.lock();
            self.refresh(&mut inner, Instant::now(), &mut events);
            match inner.state {
                BreakerState::Closed => Some((inner.generation, false)),
                BreakerState::Open => None,
                BreakerState::HalfOpen => {
                    if inner.trials_in_flight < self.config.half_open_max_trials {
                        inner.trials_in_flight += 1;
                        Some((inner.generation, true))
                    } else {
                        None
                    }
                }
            }
        };
        self.publish(events);

        admitted.map(|(generation, trial)| Ticket {
            breaker: self,
            generation,
            trial,
            completed: false,
        })
    }

    fn complete(&self, generation: u64, trial: bool, success: bool) {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            let now = Instant::now();
            self.refresh(&mut inner, now, &mut events);
            inner.window.record(now, success);

            let kind = if success {
                BreakerEventKind::Success
            } else {
                BreakerEventKind::Failure
            };
            events.push(self.event(kind, inner.state));

            if inner.generation == generation {
                match inner.state {
                    BreakerState::Closed if !success => {
                        let (successes, failures) = inner.window.totals(now);
                        let total = successes + failures;
                        let threshold = u32::from(self.config.error_threshold_percentage);
                        if total >= self.config.volume_threshold && failures * 100 >= threshold * total {
                            tracing::warn!(
                                service = %self.name,
                                failures,
                                total,
                                threshold_pct = threshold,
                                "Circuit breaker error rate exceeded"
                            );
                            self.transition(&mut inner, BreakerState::Open, now, &mut events);
                        }
                    }
                    BreakerState::HalfOpen if trial => {
                        inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                        if success {
                            inner.trial_successes += 1;
                            if inner.trial_successes >= self.config.half_open_success_threshold {
                                self.transition(&mut inner, BreakerState::Closed, now, &mut events);
                            }
                        } else {
                            self.transition(&mut inner, BreakerState::Open, now, &mut events);
                        }
                    }
                    _ => {}
                }
            }
        }
        self.publish(events);
    }

    fn refresh(&self, inner: &mut Inner, now: Instant, events: &mut Vec<BreakerEvent>) {
        if inner.state != BreakerState::Open {
            return;
        }
        let due = inner
            .opened_at
            .map(|at| now.saturating_duration_since(at) >= self.config.reset_timeout())
            .unwrap_or(true);
        if due {
            self.transition(inner, BreakerState::HalfOpen, now, events);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant, events: &mut Vec<BreakerEvent>) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.last_state_change = SystemTime::now();
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;

        let kind = match to {
            BreakerState::Open => {
                inner.opened_at = Some(now);
                BreakerEventKind::Opened
            }
            BreakerState::HalfOpen => BreakerEventKind::HalfOpened,
            BreakerState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
                BreakerEventKind::Closed
            }
        };

        tracing::info!(service = %self.name, %from, %to, "Circuit breaker state change");
        events.push(self.event(kind, to));
    }

    fn event(&self, kind: BreakerEventKind, state: BreakerState) -> BreakerEvent {
        BreakerEvent {
            breaker: self.name.clone(),
            kind,
            state,
            at: SystemTime::now(),
        }
    }

    fn publish(&self, events: Vec<BreakerEvent>) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
