//! Bounded history with batch trimming.
//!
//! The buffer grows up to `capacity` entries. The insert that pushes it past
//! `capacity` drops the oldest entries in one batch, leaving the most recent
//! `trim_to` entries.

use std::collections::VecDeque;

/// Default number of entries retained before a batch trim.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default number of entries kept after a batch trim.
pub const DEFAULT_TRIM_TO: usize = 500;

/// An append-only history that trims in batches.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    capacity: usize,
    trim_to: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    /// Creates a history that trims to `trim_to` once it exceeds `capacity`.
    ///
    /// `trim_to` is clamped to `capacity`.
    pub fn new(capacity: usize, trim_to: usize) -> Self {
        Self {
            capacity,
            trim_to: trim_to.min(capacity),
            entries: VecDeque::new(),
        }
    }

    /// Appends an entry, trimming if the history is now over capacity.
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            let excess = self.entries.len() - self.trim_to;
            self.entries.drain(..excess);
        }
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Maximum number of entries before a trim.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TRIM_TO)
    }
}
