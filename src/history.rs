//! Linear undo/redo history over graph snapshots
//!
//! Snapshots hold `Arc<Node>` handles, so capturing one copies a pointer per
//! node. A node is only cloned when the live graph mutates it while a
//! snapshot still references the old version.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::nodes::{Edge, Node};

/// Default bound of both history stacks
pub const MAX_HISTORY: usize = 30;

/// Immutable copy of the structural graph state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: Vec<Arc<Node>>,
    pub edges: Vec<Edge>,
}

#[derive(Debug)]
pub struct History {
    past: VecDeque<GraphSnapshot>,
    future: VecDeque<GraphSnapshot>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::with_capacity(limit),
            future: VecDeque::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record the state before a mutation. Discards the redo branch.
    pub fn push(&mut self, snapshot: GraphSnapshot) {
        push_bounded(&mut self.past, snapshot, self.limit);
        self.future.clear();
    }

    /// Swap `current` for the most recent past state
    pub fn undo(&mut self, current: GraphSnapshot) -> Option<GraphSnapshot> {
        let previous = self.past.pop_back()?;
        push_bounded(&mut self.future, current, self.limit);
        Some(previous)
    }

    /// Swap `current` for the most recently undone state
    pub fn redo(&mut self, current: GraphSnapshot) -> Option<GraphSnapshot> {
        let next = self.future.pop_back()?;
        push_bounded(&mut self.past, current, self.limit);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}

fn push_bounded(stack: &mut VecDeque<GraphSnapshot>, snapshot: GraphSnapshot, limit: usize) {
    stack.push_back(snapshot);
    while stack.len() > limit {
        stack.pop_front();
    }
}
