//! Exponential reconnect backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Doubling delay from `base` up to `cap`.
///
/// Each delay is jittered into `[d/2, d]` so many forwarders restarting at
/// once do not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Delay before the next attempt, without jitter
    pub fn current_ceiling(&self) -> Duration {
        let factor = 1u32 << self.attempt.min(20);
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.current_ceiling();
        self.attempt = self.attempt.saturating_add(1);
        jitter(ceiling)
    }

    /// Start over from `base` after a successful connect
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

fn jitter(ceiling: Duration) -> Duration {
    let micros = ceiling.as_micros() as u64;
    let half = micros / 2;
    let offset = rand::thread_rng().gen_range(0..=micros - half);
    Duration::from_micros(half + offset)
}
