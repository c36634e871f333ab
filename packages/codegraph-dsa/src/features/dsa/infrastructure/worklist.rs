//! Dependency-driven worklist
//!
//! FIFO queue with a pending set: an item already waiting is not enqueued
//! twice. `run_to_fixpoint` drains the queue through a step function that
//! may push follow-up items, bounded by an optional iteration cap.

use crate::errors::{DsaError, Result};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::hash::Hash;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DependencyWorklist<T> {
    queue: VecDeque<T>,
    pending: FxHashSet<T>,
}

impl<T> Default for DependencyWorklist<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            pending: FxHashSet::default(),
        }
    }
}

impl<T: Copy + Eq + Hash> DependencyWorklist<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `item` unless it is already pending
    pub fn push(&mut self, item: T) -> bool {
        if self.pending.insert(item) {
            self.queue.push_back(item);
            true
        } else {
            false
        }
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let item = self.queue.pop_front()?;
        self.pending.remove(&item);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.pending.contains(item)
    }

    /// Process items until the queue is empty
    ///
    /// `step` receives each dequeued item and the worklist to push follow-up
    /// items onto. Returns the number of items processed. Fails with
    /// `DsaError::IterationLimit` once more than `max_iterations` items were
    /// processed (0 = unlimited).
    pub fn run_to_fixpoint<F>(&mut self, max_iterations: usize, mut step: F) -> Result<usize>
    where
        F: FnMut(T, &mut Self) -> Result<()>,
    {
        let mut iterations = 0;
        while let Some(item) = self.pop() {
            if max_iterations != 0 && iterations >= max_iterations {
                warn!(
                    iterations,
                    remaining = self.len() + 1,
                    "worklist iteration limit reached"
                );
                return Err(DsaError::IterationLimit {
                    iterations,
                    limit: max_iterations,
                });
            }
            iterations += 1;
            step(item, self)?;
        }
        Ok(iterations)
    }
}
