// src/history/mod.rs

//! Snapshot-based undo/redo.
//!
//! - [`HistoryManager`] holds two bounded stacks of full snapshots.
//! - [`debounce::SnapshotDebouncer`] coalesces bursts of high-frequency
//!   edits into one snapshot per idle period.
//!
//! History is scoped to one manager instance owned by a session; there is no
//! process-wide history.

pub mod debounce;

use std::collections::VecDeque;
use std::time::Duration;

use tracing::debug;

pub use debounce::SnapshotDebouncer;

pub const DEFAULT_CAPACITY: usize = 50;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Capacity and coalescing window for a session's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistorySettings {
    pub capacity: usize,
    pub debounce: Duration,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Bounded undo/redo stacks of full state snapshots.
///
/// The edit layer calls [`snapshot`](Self::snapshot) with the state *before*
/// each mutation. When a stack overflows its capacity the oldest entry is
/// evicted.
#[derive(Debug, Clone)]
pub struct HistoryManager<S> {
    capacity: usize,
    undo: VecDeque<S>,
    redo: VecDeque<S>,
}

impl<S: Clone> HistoryManager<S> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            undo: VecDeque::new(),
            redo: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the pre-mutation state. Clears the redo stack.
    pub fn snapshot(&mut self, state: S) {
        push_bounded(&mut self.undo, state, self.capacity);
        self.redo.clear();
        debug!(undo = self.undo.len(), "history snapshot recorded");
    }

    /// Pop the latest snapshot for the caller to install, pushing `current`
    /// onto the redo stack. `None` (and no change) if there is nothing to
    /// undo.
    pub fn undo(&mut self, current: S) -> Option<S> {
        let previous = self.undo.pop_back()?;
        push_bounded(&mut self.redo, current, self.capacity);
        Some(previous)
    }

    /// Symmetric to [`undo`](Self::undo).
    pub fn redo(&mut self, current: S) -> Option<S> {
        let next = self.redo.pop_back()?;
        push_bounded(&mut self.undo, current, self.capacity);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl<S: Clone> Default for HistoryManager<S> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn push_bounded<S>(stack: &mut VecDeque<S>, state: S, capacity: usize) {
    stack.push_back(state);
    while stack.len() > capacity {
        stack.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_then_redo_restores_state() {
        let mut h = HistoryManager::new(10);
        let mut state = 0;

        for next in 1..=3 {
            h.snapshot(state);
            state = next;
        }

        for _ in 0..3 {
            state = h.undo(state).unwrap();
        }
        assert_eq!(state, 0);
        assert!(h.undo(state).is_none());

        for _ in 0..3 {
            state = h.redo(state).unwrap();
        }
        assert_eq!(state, 3);
        assert!(!h.can_redo());
    }

    #[test]
    fn new_snapshot_clears_redo() {
        let mut h = HistoryManager::new(10);
        h.snapshot(0);
        let restored = h.undo(1).unwrap();
        assert_eq!(restored, 0);
        assert!(h.can_redo());

        h.snapshot(0);
        assert!(!h.can_redo());
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let mut h = HistoryManager::new(3);
        for i in 0..5 {
            h.snapshot(i);
        }
        assert_eq!(h.undo_len(), 3);

        let mut state = 5;
        let mut seen = Vec::new();
        while let Some(prev) = h.undo(state) {
            seen.push(prev);
            state = prev;
        }
        assert_eq!(seen, vec![4, 3, 2]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let h: HistoryManager<u8> = HistoryManager::new(0);
        assert_eq!(h.capacity(), 1);
    }
}
