//! Bounded undo/redo history of schema snapshots

use crate::core::schema::Table;
use std::collections::VecDeque;

/// Undo depth when none is configured
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Snapshot stack with a cursor.
///
/// Entries before the cursor are undo targets. Once an undo happens the state
/// it replaced is kept at the cursor's old slot so redo can return to it.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    entries: VecDeque<Vec<Table>>,
    cursor: usize,
    max_depth: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl HistoryManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_depth,
        }
    }

    /// Record the state that is about to be replaced. Drops any redo entries
    /// and the oldest snapshots beyond the depth limit.
    pub fn record(&mut self, snapshot: &[Table]) {
        self.entries.truncate(self.cursor);
        self.entries.push_back(snapshot.to_vec());
        while self.entries.len() > self.max_depth {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len();
    }

    /// Step back. `current` is the live state, kept for a later redo.
    pub fn undo(&mut self, current: &[Table]) -> Option<Vec<Table>> {
        if self.cursor == 0 {
            return None;
        }
        if self.cursor == self.entries.len() {
            self.entries.push_back(current.to_vec());
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn redo(&mut self) -> Option<Vec<Table>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Number of undo steps available
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
