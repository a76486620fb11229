//! Rolling latency window

use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept per collection
pub const LATENCY_WINDOW_SIZE: usize = 10;

/// Fixed-capacity ring of the most recent latencies
///
/// Not synchronized; the owning dialer serializes access through its
/// collection lock.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record a sample, evicting the oldest when full
    pub fn append_latency(&mut self, latency: Duration) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// Mean of the held samples and how many there are (zero when empty)
    pub fn avg_latency(&self) -> (Duration, usize) {
        let count = self.samples.len();
        if count == 0 {
            return (Duration::ZERO, 0);
        }
        let sum: Duration = self.samples.iter().sum();
        (sum / count as u32, count)
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(LATENCY_WINDOW_SIZE)
    }
}
