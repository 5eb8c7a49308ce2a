//! Bounded non-blocking job queues
//!
//! The orchestrator owns two of these per run: a work queue seeded with all
//! test groups before any worker starts, and a result queue drained after
//! every worker has terminated. Workers treat a `None` from
//! [`JobQueue::pop_nonblocking`] as their termination condition, not a retry
//! signal, because all items are pushed up-front.

use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

/// Queue errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full (capacity {0})")]
    Full(usize),
}

/// Bounded FIFO queue, safe to share across worker tasks behind an `Arc`.
#[derive(Debug)]
pub struct JobQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> JobQueue<T> {
    /// Create a queue bounded to `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an item, failing if the queue is at capacity.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut items = self.items.lock().expect("queue lock poisoned");
        if items.len() >= self.capacity {
            return Err(QueueError::Full(self.capacity));
        }
        items.push_back(item);
        Ok(())
    }

    /// Pop the next item, or `None` when the queue is currently empty.
    pub fn pop_nonblocking(&self) -> Option<T> {
        self.items.lock().expect("queue lock poisoned").pop_front()
    }

    /// Remove and return every queued item in FIFO order.
    pub fn drain_all(&self) -> Vec<T> {
        self.items
            .lock()
            .expect("queue lock poisoned")
            .drain(..)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fifo_order() {
        let queue = JobQueue::new(3);
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.push("c").unwrap();

        assert_eq!(queue.pop_nonblocking(), Some("a"));
        assert_eq!(queue.pop_nonblocking(), Some("b"));
        assert_eq!(queue.pop_nonblocking(), Some("c"));
        assert_eq!(queue.pop_nonblocking(), None);
    }

    #[test]
    fn push_past_capacity_fails() {
        let queue = JobQueue::new(1);
        queue.push(1).unwrap();
        assert_eq!(queue.push(2), Err(QueueError::Full(1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_empties_the_queue() {
        let queue = JobQueue::new(4);
        for n in 0..4 {
            queue.push(n).unwrap();
        }
        assert_eq!(queue.drain_all(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.drain_all(), Vec::<i32>::new());
    }

    #[test]
    fn concurrent_consumers_split_the_items() {
        let queue = Arc::new(JobQueue::new(100));
        for n in 0..100 {
            queue.push(n).unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(std::thread::spawn(move || {
                let mut taken = Vec::new();
                while let Some(item) = queue.pop_nonblocking() {
                    taken.push(item);
                }
                taken
            }));
        }

        let mut all: Vec<i32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }
}
