//! Sliding-window request-rate meter.
//!
//! # Responsibilities
//! - Append one monotonic timestamp per routed request
//! - Report requests per second over the trailing window
//! - Drop entries past retention from the head
//!
//! # Design Decisions
//! - Timestamps are `tokio::time::Instant` so paused-clock tests drive it
//! - The rate is recomputed on every read; nothing is cached

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RequestLog {
    entries: Mutex<VecDeque<Instant>>,
    window: Duration,
    retention: Duration,
}

impl RequestLog {
    pub fn new(window: Duration, retention: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            window,
            retention,
        }
    }

    pub fn record(&self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&self, at: Instant) {
        self.entries
            .lock()
            .expect("request log mutex poisoned")
            .push_back(at);
    }

    /// Requests per second over the trailing window.
    pub fn rate(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    pub fn rate_at(&self, now: Instant) -> f64 {
        let window_secs = self.window.as_secs_f64();
        if window_secs <= 0.0 {
            return 0.0;
        }
        let entries = self.entries.lock().expect("request log mutex poisoned");
        let count = match now.checked_sub(self.window) {
            Some(cutoff) => entries.iter().rev().take_while(|t| **t >= cutoff).count(),
            None => entries.len(),
        };
        count as f64 / window_secs
    }

    /// Drop entries older than the retention period. Returns how many went.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let Some(cutoff) = now.checked_sub(self.retention) else {
            return 0;
        };
        let mut entries = self.entries.lock().expect("request log mutex poisoned");
        let before = entries.len();
        while entries.front().is_some_and(|t| *t <= cutoff) {
            entries.pop_front();
        }
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("request log mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
