use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Queue capacity used when a component does not configure its own.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Thread-safe bounded FIFO with blocking and timed operations.
///
/// `push_timeout` is the backpressure path and never grows the queue past
/// its capacity. `push` is the control-plane path: it always succeeds, even
/// if that momentarily exceeds capacity, so urgent items (a worker's stop
/// request) cannot be refused.
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Block until an item is available and return it
    pub fn pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                self.not_full.notify_one();
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Like `pop`, but gives up once `timeout` elapses
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if self.not_empty.wait_until(&mut items, deadline).timed_out() {
                // One last check: the notify may have raced the deadline.
                let item = items.pop_front();
                if item.is_some() {
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    /// Insert unconditionally and wake one waiter
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
    }

    /// Insert once capacity allows, or return the item after `timeout`
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while items.len() >= self.capacity {
            if self.not_full.wait_until(&mut items, deadline).timed_out() {
                if items.len() < self.capacity {
                    break;
                }
                return Err(item);
            }
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }
}
