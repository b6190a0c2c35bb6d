//! Circuit breaker for the classifier dependency.
//!
//! Modeled as an explicit finite-state machine rather than ad-hoc flags:
//!
//! ```text
//! Closed{failures} --(failures == threshold)--> Open{until}
//! Open{until}      --(cooldown elapsed)------> HalfOpen
//! HalfOpen         --(probe succeeds)--------> Closed{0}
//! HalfOpen         --(probe fails)-----------> Open{until}
//! ```
//!
//! State is process-local per client instance (one per partition worker); no
//! cross-worker sharing is needed because each worker backs off independently.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// A breaker that opens after `failure_threshold` consecutive failures
    /// and stays open for `cooldown`.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Whether a call may proceed at `now`.
    ///
    /// Transitions `Open → HalfOpen` once the cooldown has elapsed, letting a
    /// probe call through. Returns `false` while the circuit is open.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open { until } => {
                if now >= until {
                    *state = BreakerState::HalfOpen;
                    tracing::info!("circuit breaker half-open — allowing probe call");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call: resets the failure count and closes the
    /// circuit from half-open.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = BreakerState::Closed { failures: 0 };
    }

    /// Record a failed call at `now`: bumps the consecutive-failure count and
    /// opens the circuit when the threshold is reached. A half-open probe
    /// failure re-opens immediately.
    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    tracing::warn!(
                        failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "circuit breaker opened"
                    );
                    *state = BreakerState::Open {
                        until: now + self.cooldown,
                    };
                } else {
                    *state = BreakerState::Closed { failures };
                }
            }
            BreakerState::HalfOpen => {
                tracing::warn!("half-open probe failed — circuit breaker re-opened");
                *state = BreakerState::Open {
                    until: now + self.cooldown,
                };
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// True while calls would be rejected at `now` (without transitioning).
    #[must_use]
    pub fn is_open_at(&self, now: Instant) -> bool {
        let state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        matches!(*state, BreakerState::Open { until } if now < until)
    }
}
