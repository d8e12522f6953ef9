//! Consecutive-failure circuit breaker.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Two-state breaker: Closed until `failure_threshold` consecutive failures,
/// then Open until `reset_timeout` has elapsed.
///
/// The Open to Closed transition is lazy: it happens on the first call
/// arriving after the reset window, which is then allowed through.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a call, or returns the time left before the circuit may close.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        let Some(opened_at) = state.opened_at else {
            return Ok(());
        };

        let elapsed = opened_at.elapsed();
        if elapsed < self.reset_timeout {
            return Err(self.reset_timeout - elapsed);
        }

        tracing::info!("Circuit reset window elapsed, closing circuit");
        state.opened_at = None;
        state.consecutive_failures = 0;
        Ok(())
    }

    /// Records a success, zeroing the failure counter.
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    /// Records a failure, opening the circuit at the threshold.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures += 1;

        if state.opened_at.is_none() && state.consecutive_failures >= self.failure_threshold {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = state.consecutive_failures,
                reset_secs = self.reset_timeout.as_secs(),
                "Circuit opened"
            );
        }
    }

    /// Current state, without triggering the lazy transition.
    pub fn state(&self) -> CircuitState {
        if self.lock().opened_at.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Failures since the last success or reset.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_closes_lazily() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let remaining = breaker.try_acquire().expect_err("circuit is open");
        assert_eq!(remaining, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        // Still reported open until a call arrives
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn test_success_resets_counter() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
