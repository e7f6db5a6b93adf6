//! Circuit breaker for the cache store.
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                        |
//!     |  success                               | timeout elapsed
//!     |                                        v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```
//!
//! Half-open admits a single probe; its outcome either closes or re-opens
//! the circuit. A success in any state resets the failure count.

use std::time::{Duration, Instant};

#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { probes: u32 },
}

/// Three-state failure guard in front of the cache store.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    /// Creates a breaker that opens after `failure_threshold` consecutive
    /// failures and stays open for `reset_timeout`.
    #[must_use]
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed { failures: 0 },
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Checks whether a request may proceed.
    ///
    /// In the open state this transitions to half-open once the reset
    /// timeout has elapsed and admits the probe.
    pub fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    tracing::info!(target: "cache", "circuit breaker transitioning to half-open");
                    self.state = BreakerState::HalfOpen { probes: 1 };
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen { ref mut probes } => {
                if *probes >= 1 {
                    false
                } else {
                    *probes += 1;
                    true
                }
            },
        }
    }

    /// Records a successful operation, closing the circuit.
    pub fn on_success(&mut self) {
        if !matches!(self.state, BreakerState::Closed { failures: 0 }) {
            tracing::info!(target: "cache", "circuit breaker closing after success");
        }
        self.state = BreakerState::Closed { failures: 0 };
    }

    /// Records a failed operation.
    ///
    /// Returns `true` if the circuit just opened.
    pub fn on_failure(&mut self) -> bool {
        match self.state {
            BreakerState::Closed { ref mut failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    tracing::warn!(
                        target: "cache",
                        failures = *failures,
                        threshold = self.failure_threshold,
                        "circuit breaker opened after consecutive failures"
                    );
                    self.state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                    return true;
                }
            },
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(target: "cache", "circuit breaker re-opened after half-open failure");
                self.state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
                return true;
            },
            BreakerState::Open { .. } => {},
        }
        false
    }

    /// Current state as a short name.
    #[must_use]
    pub const fn state_name(&self) -> &'static str {
        match self.state {
            BreakerState::Closed { .. } => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen { .. } => "half_open",
        }
    }

    /// Current state as a numeric value for metrics.
    ///
    /// - 0: Closed
    /// - 1: Open
    /// - 2: Half-Open
    #[must_use]
    pub const fn state_value(&self) -> u8 {
        match self.state {
            BreakerState::Closed { .. } => 0,
            BreakerState::Open { .. } => 1,
            BreakerState::HalfOpen { .. } => 2,
        }
    }

    /// Consecutive failures observed while closed; the threshold once open.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        match self.state {
            BreakerState::Closed { failures } => failures,
            BreakerState::Open { .. } | BreakerState::HalfOpen { .. } => self.failure_threshold,
        }
    }
}
