//! Bounded log of snapshots captured during high-risk periods.
//!
//! Ring semantics: once `capacity` entries are held, each insert evicts the
//! oldest. Inserting never blocks and never fails. Nothing in the decision
//! path reads the buffer; it exists for offline inspection by whoever owns
//! the scheduler.

use std::collections::VecDeque;

use crate::config::ConfigError;
use crate::metrics::MetricsSnapshot;

#[derive(Debug, Clone)]
pub struct RiskBuffer {
    entries: VecDeque<MetricsSnapshot>,
    capacity: usize,
    /// Lifetime insert count, including evicted entries.
    total_stored: u64,
    evicted: u64,
}

impl RiskBuffer {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer_capacity",
                value: "0".to_string(),
                reason: "must be >= 1",
            });
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total_stored: 0,
            evicted: 0,
        })
    }

    pub fn store(&mut self, snapshot: MetricsSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(snapshot);
        self.total_stored += 1;
    }

    /// Current occupancy.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_stored(&self) -> u64 {
        self.total_stored
    }

    /// Number of entries lost to eviction so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Oldest-first view of the retained snapshots.
    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.entries.iter()
    }

    /// Remove and return every retained snapshot, oldest first.
    pub fn drain(&mut self) -> Vec<MetricsSnapshot> {
        self.entries.drain(..).collect()
    }
}
