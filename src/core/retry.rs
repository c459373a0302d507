//! Purpose: Bounded, fixed-backoff retry loop shared by every polling stage.
//! Exports: `RetryPolicy`, `Step`.
//! Role: Replaces ad-hoc decrementing counters in the bridge, launcher, poller and validator.
//! Invariants: `op` runs at most `attempts` times; the delay is slept only between attempts.
//! Invariants: A fatal error from `op` is returned immediately without further attempts.
use std::time::Duration;

use crate::core::error::Error;

/// Outcome of a single attempt.
#[derive(Debug, Eq, PartialEq)]
pub enum Step<T> {
    Done(T),
    Retry,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Zero-delay policy, for simulated devices.
    pub const fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    /// Run `op` with 1-based attempt numbers until it is done, fails fatally, or the
    /// budget runs out; in the last case the error from `on_exhausted` is returned.
    pub fn run<T>(
        &self,
        mut op: impl FnMut(u32) -> Result<Step<T>, Error>,
        on_exhausted: impl FnOnce(u32) -> Error,
    ) -> Result<T, Error> {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if let Step::Done(value) = op(attempt)? {
                return Ok(value);
            }
            if attempt < attempts && !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
        }
        Err(on_exhausted(attempts))
    }
}
