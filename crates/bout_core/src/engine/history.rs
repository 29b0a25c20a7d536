//! Bounded undo log of applied scoring operations.

use crate::models::{Color, ConnectionId};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    /// Points added to (or removed from) one color. `delta` is the effective
    /// change after flooring at zero.
    Score {
        color: Color,
        delta: i64,
        /// Referees whose quorum produced the award; empty for operator adjustments
        by: Vec<ConnectionId>,
    },
    /// Penalty against `color`, which also gave one point to its opponent.
    Penalty { color: Color },
}

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
        }
    }

    /// Push, discarding the oldest entry once full.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_stack_drops_oldest() {
        let mut h = History::with_capacity(3);
        for delta in 1..=5 {
            h.push(HistoryEntry::Score {
                color: Color::Red,
                delta,
                by: vec![],
            });
        }
        assert_eq!(h.len(), 3);
        let popped: Vec<i64> = std::iter::from_fn(|| h.pop())
            .map(|e| match e {
                HistoryEntry::Score { delta, .. } => delta,
                HistoryEntry::Penalty { .. } => 0,
            })
            .collect();
        assert_eq!(popped, vec![5, 4, 3]);
        assert!(h.is_empty());
        assert!(h.pop().is_none());
    }
}
