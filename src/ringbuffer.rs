//! Ringbuffer module for tracking per-group sample history.
//!
//! This module provides a fixed-size ringbuffer for storing `MetricsPoint`
//! entries with predictable memory usage. Eviction of the oldest entry is an
//! O(1) overwrite at the write index.

use serde::{Deserialize, Serialize};

/// One aggregated sample for a software group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsPoint {
    /// Sample time in seconds since the Unix epoch.
    #[serde(rename = "t")]
    pub timestamp: f64,
    pub process_count: u64,
    /// Sum of instantaneous CPU percent (local collection only).
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(rename = "mem")]
    pub memory_bytes: u64,
}

/// A circular buffer for storing metric points with fixed capacity.
#[derive(Clone, Debug)]
pub struct Ringbuffer {
    entries: Vec<MetricsPoint>,
    capacity: usize,
    write_index: usize,
    count: usize,
}

impl Ringbuffer {
    /// Creates a new ringbuffer with the specified capacity.
    ///
    /// A capacity of zero is bumped to one so that `push` never divides by zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            write_index: 0,
            count: 0,
        }
    }

    /// Pushes a new point into the ringbuffer.
    ///
    /// If the buffer is full, the oldest point will be overwritten.
    pub fn push(&mut self, point: MetricsPoint) {
        if self.entries.len() < self.capacity {
            self.entries.push(point);
        } else {
            self.entries[self.write_index] = point;
        }
        self.write_index = (self.write_index + 1) % self.capacity;

        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Returns all points in chronological order (oldest to newest).
    pub fn get_history(&self) -> Vec<MetricsPoint> {
        if self.count == 0 {
            return Vec::new();
        }

        let mut result = Vec::with_capacity(self.count);

        if self.count < self.capacity {
            // Buffer not yet full, entries are in order from 0 to count-1
            result.extend_from_slice(&self.entries[0..self.count]);
        } else {
            // Buffer is full, oldest entry sits at write_index
            result.extend_from_slice(&self.entries[self.write_index..]);
            result.extend_from_slice(&self.entries[0..self.write_index]);
        }

        result
    }

    /// Returns the most recently pushed point.
    pub fn last(&self) -> Option<&MetricsPoint> {
        if self.count == 0 {
            return None;
        }
        let idx = (self.write_index + self.capacity - 1) % self.capacity;
        self.entries.get(idx)
    }

    /// Returns the current number of points in the buffer.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns the maximum capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
