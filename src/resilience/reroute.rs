//! Reroute tracking.
//!
//! # Responsibilities
//! - Count failed calls that were answered with a fallback response
//! - Force-trip the associated breaker when the count reaches the threshold
//!
//! # Design Decisions
//! - Fixed window: the count is zeroed on every timer tick, independent of when
//!   reroutes happened. A burst straddling a tick may therefore need up to
//!   `2 * threshold - 1` reroutes before tripping.
//! - Overlaps with the breaker's own failure statistic on purpose; this is the
//!   coarser, faster signal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RerouteConfig;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Reroutes counted since `window_start`.
#[derive(Debug, Clone, Copy)]
pub struct RerouteWindow {
    pub count: u32,
    pub window_start: Instant,
}

/// Per-backend reroute counter bound to that backend's breaker.
#[derive(Debug)]
pub struct RerouteTracker {
    breaker: Arc<CircuitBreaker>,
    threshold: u32,
    window: Duration,
    state: Mutex<RerouteWindow>,
}

impl RerouteTracker {
    pub fn new(breaker: Arc<CircuitBreaker>, config: &RerouteConfig) -> Self {
        Self {
            breaker,
            threshold: config.threshold,
            window: config.window(),
            state: Mutex::new(RerouteWindow {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Count one reroute. Returns `true` if this reroute tripped the breaker.
    pub fn record_reroute(&self) -> bool {
        let count = {
            let mut state = self.lock();
            state.count += 1;
            state.count
        };
        metrics::record_reroute(self.breaker.name());

        if count < self.threshold {
            return false;
        }

        let tripped = self.breaker.force_open("reroute threshold reached");
        if tripped {
            metrics::record_force_trip(self.breaker.name());
            tracing::warn!(
                service = %self.breaker.name(),
                reroutes = count,
                threshold = self.threshold,
                window_ms = self.window.as_millis() as u64,
                "Too many reroutes, circuit breaker forced open"
            );
        }
        tripped
    }

    /// Reroutes in the current window.
    pub fn count(&self) -> u32 {
        self.lock().count
    }

    pub fn window(&self) -> RerouteWindow {
        *self.lock()
    }

    /// Start a new window with a zero count.
    pub fn reset_window(&self) {
        let mut state = self.lock();
        if state.count > 0 {
            tracing::debug!(service = %self.breaker.name(), reroutes = state.count, "Reroute window reset");
        }
        state.count = 0;
        state.window_start = Instant::now();
    }

    /// Reset the window on a fixed tick until shutdown.
    pub async fn run_window(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.reset_window(),
                _ = shutdown.recv() => {
                    tracing::debug!(service = %self.breaker.name(), "Reroute window task stopping");
                    break;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RerouteWindow> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::resilience::circuit_breaker::BreakerState;

    fn tracker() -> (Arc<CircuitBreaker>, Arc<RerouteTracker>) {
        let breaker = Arc::new(CircuitBreaker::new("competition", BreakerConfig::default()));
        let tracker = Arc::new(RerouteTracker::new(
            breaker.clone(),
            &RerouteConfig {
                threshold: 5,
                window_ms: 5000,
            },
        ));
        (breaker, tracker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_force_trips() {
        let (breaker, tracker) = tracker();
        for _ in 0..4 {
            assert!(!tracker.record_reroute());
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        assert!(tracker.record_reroute());
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(tracker.count(), 5);

        // Already open: nothing more to trip.
        assert!(!tracker.record_reroute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_resets_count() {
        let (breaker, tracker) = tracker();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(tracker.clone().run_window(shutdown_rx));

        for _ in 0..4 {
            tracker.record_reroute();
        }
        tokio::time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(tracker.count(), 0);

        tracker.record_reroute();
        assert_eq!(breaker.state(), BreakerState::Closed);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_fixed_not_sliding() {
        let (breaker, tracker) = tracker();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(tracker.clone().run_window(shutdown_rx));

        // Reroutes at t=4.9s are cleared by the t=5s tick even though they are
        // only 100ms old, so four more at t=5.1s do not trip.
        tokio::time::sleep(Duration::from_millis(4900)).await;
        for _ in 0..4 {
            tracker.record_reroute();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..4 {
            tracker.record_reroute();
        }
        assert_eq!(tracker.count(), 4);
        assert_eq!(breaker.state(), BreakerState::Closed);

        let window = tracker.window();
        assert_eq!(window.count, 4);
    }
}
