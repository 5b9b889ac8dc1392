/// Per-action sliding-window rate limiter
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_WINDOW_MS: f64 = 60_000.0;
pub const DEFAULT_MAX_COUNT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: usize,
}

/// In-memory buckets of call timestamps, oldest first, keyed by action.
///
/// State is local to the owning process and is lost on restart.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: HashMap<String, VecDeque<f64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check against the wall clock
    pub fn check_rate_limit(&mut self, action: &str, window_ms: f64, max_count: usize) -> RateDecision {
        self.check_at(action, crate::time::now_ms(), window_ms, max_count)
    }

    /// Prune timestamps older than `now - window_ms`, then admit the call
    /// and record `now` only if the bucket still has room.
    pub fn check_at(&mut self, action: &str, now: f64, window_ms: f64, max_count: usize) -> RateDecision {
        if !now.is_finite() || max_count == 0 {
            return RateDecision {
                allowed: false,
                remaining: 0,
            };
        }

        let bucket = self.buckets.entry(action.to_string()).or_default();
        let cutoff = now - window_ms;
        while bucket.front().is_some_and(|&ts| ts < cutoff) {
            bucket.pop_front();
        }

        if bucket.len() < max_count {
            bucket.push_back(now);
            RateDecision {
                allowed: true,
                remaining: max_count - bucket.len(),
            }
        } else {
            RateDecision {
                allowed: false,
                remaining: 0,
            }
        }
    }
}
