// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity MPMC queue with blocking pop and shutdown wake.
//!
//! # Architecture
//! - `crossbeam::queue::ArrayQueue` holds the items (lock-free push/pop)
//! - Condvar for blocking consumers (idle send thread)
//! - Wake epoch so `clear()` releases every parked consumer with `None`
//! - Closed flag so a consumer that parks after `close()` returns at once
//!
//! ```text
//! producer: push() -> ArrayQueue::push -> notify_one
//! consumer: pop(true) -> ArrayQueue::pop | wait(condvar) until item, epoch bump or close
//! wake:     clear()   -> drain -> epoch += 1 -> notify_all
//! shutdown: close()   -> drain -> closed = true -> notify_all
//! ```

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};

/// Bounded FIFO queue shared between producer threads and one transmit thread.
///
/// `push` never blocks: when full the item is discarded and `false` returned.
/// This is the only backpressure mechanism of the session layer.
pub struct BoundedQueue<T> {
    items: ArrayQueue<T>,
    wake: Mutex<WakeState>,
    condvar: Condvar,
}

#[derive(Default)]
struct WakeState {
    /// Bumped by `clear()`
    epoch: u64,
    /// Set by `close()`, reset by `reopen()`
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity),
            wake: Mutex::new(WakeState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Append `item`; returns `false` (item dropped) when the queue is full.
    pub fn push(&self, item: T) -> bool {
        if self.items.push(item).is_err() {
            return false;
        }
        // Take the lock so a consumer between its empty check and wait()
        // cannot miss this notification.
        let _wake = self.wake.lock();
        self.condvar.notify_one();
        true
    }

    /// Remove the oldest item.
    ///
    /// With `blocking == false` returns immediately. With `blocking == true`
    /// waits until an item arrives or `clear()`/`close()` is called, in which
    /// case `None` is returned. On a closed queue it never waits.
    pub fn pop(&self, blocking: bool) -> Option<T> {
        if let Some(item) = self.items.pop() {
            return Some(item);
        }
        if !blocking {
            return None;
        }

        let mut wake = self.wake.lock();
        let entered = wake.epoch;
        loop {
            if let Some(item) = self.items.pop() {
                return Some(item);
            }
            if wake.closed || wake.epoch != entered {
                return None;
            }
            self.condvar.wait(&mut wake);
        }
    }

    /// Drop every queued item and wake all blocked consumers with `None`.
    pub fn clear(&self) {
        while self.items.pop().is_some() {}
        let mut wake = self.wake.lock();
        wake.epoch = wake.epoch.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Like `clear()`, and blocking pops keep returning `None` until
    /// `reopen()`.
    pub fn close(&self) {
        while self.items.pop().is_some() {}
        let mut wake = self.wake.lock();
        wake.closed = true;
        self.condvar.notify_all();
    }

    /// Let blocking pops wait again after `close()`.
    pub fn reopen(&self) {
        self.wake.lock().closed = false;
    }

    /// `true` between `close()` and `reopen()`.
    pub fn is_closed(&self) -> bool {
        self.wake.lock().closed
    }

    /// Number of queued items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.items.len())
            .field("capacity", &self.items.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_push_fails_when_full() {
        let queue = BoundedQueue::new(3);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(queue.push(3));
        assert!(!queue.push(4), "fourth push must be rejected");
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(false), Some(1));
        assert!(queue.push(5), "one slot freed by pop");
        assert!(!queue.push(6));

        assert_eq!(queue.pop(false), Some(2));
        assert_eq!(queue.pop(false), Some(3));
        assert_eq!(queue.pop(false), Some(5));
        assert_eq!(queue.pop(false), None);
    }

    #[test]
    fn test_outbound_capacity_backpressure() {
        let queue = BoundedQueue::new(crate::config::OUTBOUND_QUEUE_CAPACITY);
        for i in 0..crate::config::OUTBOUND_QUEUE_CAPACITY {
            assert!(queue.push(i));
        }
        assert!(!queue.push(usize::MAX));
        assert_eq!(queue.pop(false), Some(0));
        assert!(queue.push(1000));
        assert!(!queue.push(1001));
    }

    #[test]
    fn test_nonblocking_pop_on_empty() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(4);
        let start = Instant::now();
        assert_eq!(queue.pop(false), None);
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_blocking_pop_receives_pushed_item() {
        let queue = Arc::new(BoundedQueue::new(4));
        let q = Arc::clone(&queue);

        let consumer = thread::spawn(move || q.pop(true));
        thread::sleep(Duration::from_millis(20));
        assert!(queue.push(42u32));

        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    /// Give spawned consumers time to reach the condvar wait.
    fn let_consumers_park() {
        thread::sleep(Duration::from_millis(100));
    }

    #[test]
    fn test_single_clear_wakes_parked_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        let q = Arc::clone(&queue);

        let consumer = thread::spawn(move || q.pop(true));
        let_consumers_park();
        assert!(!consumer.is_finished(), "consumer should be blocked");

        let start = Instant::now();
        queue.clear();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(start.elapsed() < Duration::from_secs(1), "one clear must wake");
    }

    #[test]
    fn test_single_clear_wakes_every_waiter() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&queue);
                thread::spawn(move || q.pop(true))
            })
            .collect();
        let_consumers_park();

        queue.clear();
        for c in consumers {
            assert_eq!(c.join().unwrap(), None);
        }
    }

    #[test]
    fn test_close_releases_late_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        queue.push(7);
        queue.close();
        assert!(queue.is_closed());
        assert!(queue.is_empty());

        // Arrives after close(): must not park
        let q = Arc::clone(&queue);
        let consumer = thread::spawn(move || q.pop(true));
        assert_eq!(consumer.join().unwrap(), None);

        queue.reopen();
        assert!(!queue.is_closed());
        assert!(queue.push(8));
        assert_eq!(queue.pop(true), Some(8));
    }

    #[test]
    fn test_close_wakes_parked_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(4));
        let q = Arc::clone(&queue);
        let consumer = thread::spawn(move || q.pop(true));
        let_consumers_park();

        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_clear_discards_items() {
        let queue = BoundedQueue::new(4);
        queue.push("a");
        queue.push("b");
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(false), None);
        // Usable again after clear
        assert!(queue.push("c"));
        assert_eq!(queue.pop(true), Some("c"));
    }

    #[test]
    fn test_fifo_across_threads() {
        let queue = Arc::new(BoundedQueue::new(256));
        let q = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            for i in 0..200u32 {
                while !q.push(i) {
                    thread::yield_now();
                }
            }
        });

        let mut received = Vec::with_capacity(200);
        while received.len() < 200 {
            if let Some(v) = queue.pop(true) {
                received.push(v);
            }
        }
        producer.join().unwrap();

        assert_eq!(received, (0..200).collect::<Vec<_>>());
    }
}
