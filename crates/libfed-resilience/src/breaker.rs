//! Per-system circuit breaker (spec §4.3).
//!
//! A three-state machine (`closed` / `open` / `half_open`) guarding
//! fan-out tasks. State is guarded by a `Mutex` rather than split across
//! atomics because the state transition on `is_open` depends on both the
//! current state and the elapsed time since the last failure, and must be
//! observed-and-mutated as one step to guarantee at most one probe per
//! reset window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default number of consecutive failures before tripping the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default time a breaker stays open before admitting a probe.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
}

/// A single system's circuit breaker. Constructed once on first use and
/// never destroyed for the lifetime of the process.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Record a successful call: resets to `closed`, counter 0.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
    }

    /// Record a failed call: in `closed`, increments the counter and trips
    /// to `open` at the threshold; in `half_open`, trips straight back to
    /// `open`.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.last_failure_time = Some(Instant::now());
                }
            }
            State::HalfOpen | State::Open => {
                inner.state = State::Open;
                inner.last_failure_time = Some(Instant::now());
            }
        }
    }

    /// Is the breaker currently blocking calls?
    ///
    /// If the breaker is `open` and the reset timeout has elapsed, this
    /// performs the `open -> half_open` transition as a side effect and
    /// returns `false`, admitting exactly one probe. Subsequent calls while
    /// still `half_open` (i.e. before that probe reports success/failure)
    /// return `false` as well, since only `record_failure` moves
    /// `half_open` back to `open` -- callers are expected to gate actual
    /// concurrent probes with the per-host limiter, not this check alone.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => false,
            State::HalfOpen => false,
            State::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.reset_timeout {
                    inner.state = State::HalfOpen;
                    false
                } else {
                    true
                }
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }
}
