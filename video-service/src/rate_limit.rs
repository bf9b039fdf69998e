use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

// number of tracked keys after which counters from past windows are dropped
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, RateLimitDecision::Denied { .. })
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request for `key` and decides whether it may proceed.
    async fn check(&self, key: &str) -> RateLimitDecision;
}

struct WindowCount {
    index: u64,
    count: u32,
}

/// Fixed window admission control. Windows are consecutive buckets of `window` length starting at the
/// moment the limiter was created; every key gets `max` admissions per bucket.
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    started: Instant,
    counters: Mutex<HashMap<String, WindowCount>>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        FixedWindowLimiter {
            max,
            window,
            started: Instant::now(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Index of the window containing `now`, and the time left until the next one starts.
    fn window_position(&self, now: Instant) -> (u64, Duration) {
        let elapsed = now.duration_since(self.started).as_millis();
        let window = self.window.as_millis().max(1);
        let index = elapsed / window;
        let next_start = (index + 1) * window;
        (index as u64, Duration::from_millis((next_start - elapsed) as u64))
    }

    fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let (index, retry_after) = self.window_position(now);

        let mut counters = self.counters.lock();
        if counters.len() >= PRUNE_THRESHOLD {
            counters.retain(|_, counter| counter.index == index);
        }

        let counter = counters
            .entry(key.to_string())
            .or_insert(WindowCount { index, count: 0 });
        if counter.index != index {
            *counter = WindowCount { index, count: 0 };
        }

        if counter.count >= self.max {
            return RateLimitDecision::Denied { retry_after };
        }

        counter.count += 1;
        RateLimitDecision::Allowed { remaining: self.max - counter.count }
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        let decision = self.check_at(key, Instant::now());
        if decision.is_denied() {
            tracing::info!("Rate limit hit for {}", key);
        }
        decision
    }
}
