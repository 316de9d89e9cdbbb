//! Breaker event subscriber.
//!
//! Drains a breaker's event channel into the log and the metrics recorder.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerEvent, BreakerEventKind};

/// Consume events until the breaker goes away or shutdown fires.
pub async fn log_breaker_events(
    mut events: broadcast::Receiver<BreakerEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => observe(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Breaker event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

fn observe(event: &BreakerEvent) {
    metrics::record_breaker_event(&event.breaker, event.kind.as_str());
    match event.kind {
        BreakerEventKind::Opened => {
            tracing::warn!(service = %event.breaker, state = %event.state, at = ?event.at, "Breaker opened");
        }
        BreakerEventKind::HalfOpened | BreakerEventKind::Closed => {
            tracing::info!(service = %event.breaker, state = %event.state, event = event.kind.as_str(), "Breaker transition");
        }
        BreakerEventKind::Failure => {
            tracing::debug!(service = %event.breaker, state = %event.state, "Breaker recorded failure");
        }
        BreakerEventKind::Success => {
            tracing::trace!(service = %event.breaker, state = %event.state, "Breaker recorded success");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::resilience::circuit_breaker::CircuitBreaker;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let breaker = CircuitBreaker::new("user", BreakerConfig::default());
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(log_breaker_events(breaker.subscribe(), rx));

        breaker.force_open("test");
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_breaker_dropped() {
        let breaker = CircuitBreaker::new("user", BreakerConfig::default());
        let (_tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(log_breaker_events(breaker.subscribe(), rx));

        drop(breaker);

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
