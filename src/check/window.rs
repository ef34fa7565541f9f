//! Fixed-length debounce window of tri-state results.

use crate::types::Tristate;
use std::collections::VecDeque;

/// The N most recent per-cycle results, oldest first.
///
/// The length is fixed at construction and never changes; every push evicts
/// the oldest entry. A fresh window holds only `Unknown`.
#[derive(Debug, Clone)]
pub struct CheckWindow {
    entries: VecDeque<Tristate>,
}

impl CheckWindow {
    /// Create a window of `len` entries. Zero is rounded up to one.
    pub fn new(len: usize) -> Self {
        let len = len.max(1);
        Self {
            entries: std::iter::repeat(Tristate::Unknown).take(len).collect(),
        }
    }

    /// Shift in a new result, evicting the oldest.
    pub fn push(&mut self, result: Tristate) {
        self.entries.pop_front();
        self.entries.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn newest(&self) -> Tristate {
        self.entries.back().copied().unwrap_or_default()
    }

    /// True only if every entry is `Bad`.
    pub fn all_bad(&self) -> bool {
        self.entries.iter().all(|e| e.is_bad())
    }

    pub fn iter(&self) -> impl Iterator<Item = Tristate> + '_ {
        self.entries.iter().copied()
    }
}
