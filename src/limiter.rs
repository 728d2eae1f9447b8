//! Sliding-window request limiter keyed by client.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_GENERATE_PER_MINUTE: usize = 12;
pub const DEFAULT_VALIDATE_PER_MINUTE: usize = 30;

/// Allows at most `max_requests` per key within any `window`.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        SlidingWindowLimiter {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record a request for `key` now. Returns false when over the limit.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Same as [`allow`](Self::allow) with an explicit clock reading.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = hits.entry(key.to_string()).or_default();
        while let Some(oldest) = queue.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                queue.pop_front();
            } else {
                break;
            }
        }
        if queue.len() >= self.max_requests {
            return false;
        }
        queue.push_back(now);
        true
    }
}
