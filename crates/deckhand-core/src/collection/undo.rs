use std::collections::VecDeque;

use crate::models::UndoAction;

/// Bounded mutation history; the oldest entry is dropped once the limit is reached.
#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<UndoAction>,
    limit: usize,
}

impl UndoStack {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, action: UndoAction) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(action);
    }

    pub fn pop(&mut self) -> Option<UndoAction> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
