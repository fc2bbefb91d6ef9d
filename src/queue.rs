//! Ordered job queue with an atomic claim operation
//!
//! Items are enqueued with consecutive sequence indices starting at 0, then the queue is
//! turned into a [`Drain`]: a shared, single-pass handle that workers clone and pull from.
//! Each item is handed out exactly once no matter how many clones pull concurrently.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::{OperationParams, WorkItem};

/// Work items waiting to be dispatched
#[derive(Debug, Default)]
pub struct JobQueue {
    items: Vec<WorkItem>,
}

impl JobQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every URL with the same parameters, in order
    pub fn from_urls<I, S>(urls: I, params: &OperationParams) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = Self::new();
        for url in urls {
            queue.enqueue(url, params.clone());
        }
        queue
    }

    /// Append an item, assigning the next sequence index
    pub fn enqueue(&mut self, url: impl Into<String>, params: OperationParams) -> &WorkItem {
        let index = self.items.len();
        self.items.push(WorkItem::new(url.into(), index, params));
        &self.items[index]
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the queue into a claimable sequence
    pub fn drain(self) -> Drain {
        Drain {
            remaining: Arc::new(Mutex::new(self.items.into())),
        }
    }
}

/// Shared single-pass view over a drained [`JobQueue`]
///
/// Clones share the same remaining items. The lock is only held for the pop itself,
/// never across an await point.
#[derive(Clone, Debug)]
pub struct Drain {
    remaining: Arc<Mutex<VecDeque<WorkItem>>>,
}

impl Drain {
    /// Atomically take the next unclaimed item
    pub fn claim(&self) -> Option<WorkItem> {
        self.remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Items not yet claimed
    pub fn remaining(&self) -> usize {
        self.remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Iterator for Drain {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        self.claim()
    }
}
