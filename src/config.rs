use std::time::Duration;

use rand::Rng;

use crate::{
    BATCH_PAUSE_MS, BATCH_SIZE, CHECKPOINT_EVERY, FETCH_BACKOFF_MS, FETCH_JITTER_MS, MAX_ATTEMPTS,
    PROXY_COOLDOWN_MS, WORKERS,
};

/// An inclusive range of milliseconds from which random sleeps are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange::fixed(0);

    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        DelayRange { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        DelayRange::new(ms, ms)
    }

    /// Draws a random duration. A reversed range yields `min_ms`.
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    pub fn is_zero(&self) -> bool {
        self.min_ms == 0 && self.max_ms == 0
    }

    /// Sleeps for a random duration from the range, skipping the timer entirely for `ZERO`.
    pub async fn sleep(&self) {
        if self.is_zero() {
            return;
        }
        tokio::time::sleep(self.sample()).await;
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum time between two uses of the same proxy.
    pub cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            cooldown: Duration::from_millis(PROXY_COOLDOWN_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Slept before every attempt so concurrent workers don't fire in lockstep.
    pub jitter: DelayRange,
    /// Slept after a transient failure before the next attempt.
    pub backoff: DelayRange,
}

impl RetryPolicy {
    /// No sleeping at all, handy for tests and local targets.
    pub fn immediate(max_attempts: usize) -> Self {
        RetryPolicy {
            max_attempts,
            jitter: DelayRange::ZERO,
            backoff: DelayRange::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            jitter: DelayRange::new(FETCH_JITTER_MS.0, FETCH_JITTER_MS.1),
            backoff: DelayRange::new(FETCH_BACKOFF_MS.0, FETCH_BACKOFF_MS.1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub checkpoint_every: usize,
    pub pause: DelayRange,
    /// Skip items recorded in an existing checkpoint.
    pub resume: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            workers: WORKERS,
            batch_size: BATCH_SIZE,
            checkpoint_every: CHECKPOINT_EVERY,
            pause: DelayRange::new(BATCH_PAUSE_MS.0, BATCH_PAUSE_MS.1),
            resume: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stays_in_range() {
        let range = DelayRange::new(10, 20);
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
    }

    #[test]
    fn degenerate_ranges_use_min() {
        assert_eq!(DelayRange::fixed(7).sample(), Duration::from_millis(7));
        assert_eq!(DelayRange::new(9, 3).sample(), Duration::from_millis(9));
        assert!(DelayRange::ZERO.is_zero());
    }
}
