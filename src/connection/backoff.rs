use std::time::Duration;

use rand::Rng;

const MULTIPLIER: u32 = 2;
/// Each delay is scaled by a random factor in `1 ± JITTER`.
const JITTER: f64 = 0.2;

/// Exponential reconnect delay with jitter, capped at `max`.
///
/// Reset after every successful connection so a flapping link starts over
/// from the initial delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = base.saturating_mul(MULTIPLIER).min(self.max);
        self.attempts = self.attempts.saturating_add(1);

        let factor = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
        base.mul_f64(factor).min(self.max)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
