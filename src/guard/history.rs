// Speed Guard History Buffer
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use std::collections::VecDeque;
use std::sync::RwLock;

use super::sampler::Sample;

/// Fixed-capacity, chronologically ordered log of recent samples.
///
/// Appends past capacity evict exactly one entry, the oldest. Appends and
/// reads go through one `RwLock`, so a reader never sees a partial append.
pub struct HistoryBuffer {
    capacity: usize,
    samples: RwLock<VecDeque<Sample>>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, sample: Sample) {
        let mut samples = self.samples.write().unwrap_or_else(|p| p.into_inner());
        samples.push_back(sample);
        if samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// The last `k` samples, oldest first. `k` is capped to the buffer length.
    pub fn recent(&self, k: usize) -> Vec<Sample> {
        let samples = self.samples.read().unwrap_or_else(|p| p.into_inner());
        let skip = samples.len().saturating_sub(k);
        samples.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .back()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.samples.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
