//! Per-node inbound message queue.
//!
//! Every connection reader pushes into the same [`MessageQueue`]; the event
//! engine is the only consumer.  The queue is a cheap cloneable handle
//! around a mutex-guarded `VecDeque`, so each node creates one instance and
//! hands clones to its readers and its engine.
//!
//! Ordering is the order in which `push` calls acquire the lock.  There is
//! no capacity limit and no backpressure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe FIFO of received clock values.
#[derive(Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Mutex<VecDeque<u32>>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received clock value at the back.
    pub fn push(&self, clock: u32) {
        self.lock().push_back(clock);
    }

    /// Remove the oldest value.
    ///
    /// Returns `(value, remaining)` where `remaining` is the queue length
    /// after removal, observed under the same lock.
    pub fn pop(&self) -> Option<(u32, usize)> {
        let mut inner = self.lock();
        let value = inner.pop_front()?;
        Some((value, inner.len()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking producer cannot leave a VecDeque<u32> half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<u32>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue").field("len", &self.len()).finish()
    }
}

impl FromIterator<u32> for MessageQueue {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            inner: Arc::new(Mutex::new(iter.into_iter().collect())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn pop_on_empty_returns_none() {
        let queue = MessageQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn pop_reports_remaining_length() {
        let queue: MessageQueue = [4, 6, 7].into_iter().collect();
        assert_eq!(queue.pop(), Some((4, 2)));
        assert_eq!(queue.pop(), Some((6, 1)));
        assert_eq!(queue.pop(), Some((7, 0)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn clones_share_storage() {
        let producer = MessageQueue::new();
        let consumer = producer.clone();
        producer.push(9);
        assert_eq!(consumer.len(), 1);
        assert_eq!(consumer.pop(), Some((9, 0)));
        assert!(producer.is_empty());
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        const PRODUCERS: u32 = 4;
        const PER_PRODUCER: u32 = 500;

        let queue = MessageQueue::new();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push(p * 10_000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut drained = Vec::new();
        while let Some((v, remaining)) = queue.pop() {
            assert_eq!(remaining, queue.len());
            drained.push(v);
        }
        assert_eq!(drained.len(), (PRODUCERS * PER_PRODUCER) as usize);

        // Values from one producer must come out in the order it pushed them.
        for p in 0..PRODUCERS {
            let seq: Vec<u32> = drained
                .iter()
                .copied()
                .filter(|v| v / 10_000 == p)
                .collect();
            let expected: Vec<u32> = (0..PER_PRODUCER).map(|i| p * 10_000 + i).collect();
            assert_eq!(seq, expected, "producer {p} reordered");
        }
    }

    #[test]
    fn consumer_sees_pushes_made_while_draining() {
        let queue = MessageQueue::new();
        let producer = queue.clone();
        let handle = thread::spawn(move || {
            for i in 0..1000 {
                producer.push(i);
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            if let Some((v, _)) = queue.pop() {
                seen.push(v);
            }
        }
        handle.join().unwrap();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    }
}
