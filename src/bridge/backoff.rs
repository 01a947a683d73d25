use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jittered exponential backoff for agent reconnects.
///
/// Delays double from `min` up to `max`, each scaled by a random factor in
/// `[0.8, 1.2]` and clamped to `[min, max]`. [`reset`](Self::reset) after a
/// successful connect.
#[derive(Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    pub fn with_rng(min: Duration, max: Duration, rng: StdRng) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
            rng,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        let factor: f64 = self.rng.gen_range(0.8..=1.2);
        base.mul_f64(factor).clamp(self.min, self.max)
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
