use core::time::Duration;
use rand::Rng;

/// Exponential backoff with proportional jitter.
///
/// The `n`th delay is `base * 2^n`, capped at `max`, then scaled by a random
/// factor in `[1 - jitter, 1 + jitter]`.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter,
            attempt: 0,
        }
    }

    /// Number of delays handed out since creation or the last reset.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base
            .checked_mul(1_u32.checked_shl(self.attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max)
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        jitter(exp, self.jitter)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn jitter(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
    base.mul_f64(factor.max(0.0))
}
