//! Exponential backoff used by the retry worker.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::config::RetryPolicy;

/// Produces the delay before each retry of a rejected batch.
///
/// The first retry waits exactly `initial_delay`. Later retries double the
/// delay up to `max_delay` and pick a jittered value in `[delay / 2, delay]`
/// so many shippers rejected together do not retry in lockstep.
pub struct Backoff {
    policy: RetryPolicy,
    rng: StdRng,
}

impl Backoff {
    /// Create a backoff generator from the supplied policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Whether a batch that has already been retried `attempt` times may be
    /// retried again.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.policy.max_attempts
    }

    /// Upper bound of the delay before retry number `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.policy
            .initial_delay
            .saturating_mul(1u32 << doublings)
            .min(self.policy.max_delay.max(self.policy.initial_delay))
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&mut self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if attempt <= 1 {
            return ceiling;
        }
        let max_ms = ceiling.as_millis().min(u128::from(u64::MAX)) as u64;
        let min_ms = max_ms / 2;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
    }
}
