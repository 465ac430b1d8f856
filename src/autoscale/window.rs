//! Trailing buffer of per-tick traffic totals.

use std::collections::VecDeque;

/// Fixed-size trailing buffer. Starts zero-filled, so the first evaluations
/// average in the ticks that have not happened yet as zero traffic.
#[derive(Debug, Clone)]
pub struct RateWindow {
    slots: VecDeque<f64>,
}

impl RateWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: std::iter::repeat(0.0).take(capacity).collect(),
        }
    }

    /// Append the newest total, dropping the oldest.
    pub fn push(&mut self, total: f64) {
        self.slots.pop_front();
        self.slots.push_back(total);
    }

    /// Mean over every slot.
    pub fn average(&self) -> f64 {
        self.slots.iter().sum::<f64>() / self.slots.len() as f64
    }
}
