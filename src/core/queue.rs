//! Bounded multi-producer / multi-consumer record queue
//!
//! Both the dispatch queue (producers → forwarder or writer) and the
//! ingestion queue (connections → writer) are instances of this type.

use super::error::{LoggerError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Default capacity of a queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Fixed-capacity FIFO.
///
/// Cloning yields another handle onto the same queue. `enqueue` never
/// blocks; `drain_batch` blocks only while the queue is empty.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(LoggerError::config("queue", "capacity must be at least 1"));
        }
        let (sender, receiver) = bounded(capacity);
        Ok(Self {
            sender,
            receiver,
            capacity,
        })
    }

    /// Offer an item without waiting. Returns `false` when the queue is
    /// full; the item is dropped and the caller applies its drop policy.
    #[inline]
    pub fn enqueue(&self, item: T) -> bool {
        self.sender.try_send(item).is_ok()
    }

    /// Wait up to `max_wait` for the first item, then take whatever else is
    /// immediately available, up to `max_items` in total.
    pub fn drain_batch(&self, max_items: usize, max_wait: Duration) -> Vec<T> {
        let mut batch = Vec::new();
        if max_items == 0 {
            return batch;
        }

        match self.receiver.recv_timeout(max_wait) {
            Ok(item) => batch.push(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return batch,
        }

        while batch.len() < max_items {
            match self.receiver.try_recv() {
                Ok(item) => batch.push(item),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(BoundedQueue::<u32>::new(0).is_err());
    }

    #[test]
    fn test_enqueue_until_full() {
        let queue = BoundedQueue::new(3).unwrap();
        assert!(queue.enqueue(1));
        assert!(queue.enqueue(2));
        assert!(queue.enqueue(3));
        assert!(!queue.enqueue(4));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.capacity(), 3);
    }

    #[test]
    fn test_drain_batch_preserves_order_and_ceiling() {
        let queue = BoundedQueue::new(10).unwrap();
        for i in 0..7 {
            assert!(queue.enqueue(i));
        }
        let first = queue.drain_batch(5, Duration::from_millis(10));
        assert_eq!(first, vec![0, 1, 2, 3, 4]);
        let second = queue.drain_batch(5, Duration::from_millis(10));
        assert_eq!(second, vec![5, 6]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_batch_waits_on_empty_queue() {
        let queue = BoundedQueue::<u32>::new(4).unwrap();
        let start = Instant::now();
        let batch = queue.drain_batch(10, Duration::from_millis(30));
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_drain_batch_wakes_on_enqueue() {
        let queue = BoundedQueue::new(4).unwrap();
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.enqueue("late")
        });
        let batch = queue.drain_batch(10, Duration::from_secs(5));
        assert_eq!(batch, vec!["late"]);
        assert!(handle.join().unwrap());
    }
}
