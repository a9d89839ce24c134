//! Bounded record of past crash points, most recent first.

use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Number of crash points kept when no capacity is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone)]
pub struct CrashHistory {
    points: VecDeque<Decimal>,
    capacity: usize,
}

impl Default for CrashHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CrashHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a crash point; the oldest entry falls off past capacity.
    pub fn record(&mut self, crash_point: Decimal) {
        self.points.push_front(crash_point);
        self.points.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.points.front().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Decimal> {
        self.points.iter().copied().collect()
    }
}
