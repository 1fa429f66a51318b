//! A blocking, bounded multi-producer multi-consumer queue.
//!
//! `put` blocks while the queue is full; `get` blocks while the queue is
//! empty and not finished; `finish` is idempotent and wakes every blocked
//! consumer, after which `get` drains remaining items and then returns
//! `None`. Mirrors the original `BoundedQueue<T>` contract; the `W=true`
//! "wait for N consumers" variant is not built (nothing in scope needs
//! it, per the spec's own resolution of that open question).

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    finished: bool,
    full_waits: u64,
    empty_waits: u64,
}

/// Instrumentation counters, the Rust analogue of the original's
/// `PropertyTree stat()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub full_waits: u64,
    pub empty_waits: u64,
}

pub struct BoundedQueue<T> {
    max_items: usize,
    inner: Mutex<Inner<T>>,
    full_cond: Condvar,
    empty_cond: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(max_items: usize) -> Self {
        assert!(max_items > 0, "BoundedQueue requires a positive capacity");
        BoundedQueue {
            max_items,
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                finished: false,
                full_waits: 0,
                empty_waits: 0,
            }),
            full_cond: Condvar::new(),
            empty_cond: Condvar::new(),
        }
    }

    /// Put an item on the queue, blocking while it is at capacity.
    pub fn put(&self, item: T) {
        let mut guard = self.inner.lock();
        while guard.items.len() == self.max_items {
            guard.full_waits += 1;
            self.full_cond.wait(&mut guard);
        }
        guard.items.push_back(item);
        drop(guard);
        self.empty_cond.notify_one();
    }

    /// Get an item, blocking while empty and not finished. Returns `None`
    /// once the queue is both empty and finished.
    pub fn get(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        while guard.items.is_empty() && !guard.finished {
            guard.empty_waits += 1;
            self.empty_cond.wait(&mut guard);
        }
        if guard.items.is_empty() {
            debug_assert!(guard.finished);
            return None;
        }
        let was_full = guard.items.len() == self.max_items;
        let item = guard.items.pop_front();
        drop(guard);
        if was_full {
            self.full_cond.notify_one();
        }
        item
    }

    /// Indicate there is no more input coming; wakes every blocked
    /// consumer. Idempotent.
    pub fn finish(&self) {
        let mut guard = self.inner.lock();
        guard.finished = true;
        drop(guard);
        self.empty_cond.notify_all();
    }

    pub fn stats(&self) -> Stats {
        let guard = self.inner.lock();
        Stats {
            full_waits: guard.full_waits,
            empty_waits: guard.empty_waits,
        }
    }
}
