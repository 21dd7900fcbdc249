use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded FIFO handing decoded frames from a decode thread to its consumer.
///
/// Producers block while the queue is full; consumers either poll ([`VideoQueue::try_pop`]) or
/// wait. Closing wakes everyone: pushes fail from then on, pops drain what is left.
pub struct VideoQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> VideoQueue<T> {
    /// Queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Append `item`, blocking while full. Returns the item back if the queue is closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut st = self.state.lock();
        while st.items.len() >= self.capacity && !st.closed {
            self.not_full.wait(&mut st);
        }
        if st.closed {
            return Err(item);
        }
        st.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Oldest item, without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut st = self.state.lock();
        let item = st.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Oldest item, waiting until one arrives or the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut st = self.state.lock();
        loop {
            if let Some(item) = st.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if st.closed {
                return None;
            }
            self.not_empty.wait(&mut st);
        }
    }

    /// Like [`VideoQueue::pop`] but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut st = self.state.lock();
        loop {
            if let Some(item) = st.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if st.closed {
                return None;
            }
            if self.not_empty.wait_for(&mut st, timeout).timed_out() {
                let item = st.items.pop_front();
                if item.is_some() {
                    self.not_full.notify_one();
                }
                return item;
            }
        }
    }

    /// Drop every queued item.
    pub fn clear(&self) {
        self.state.lock().items.clear();
        self.not_full.notify_all();
    }

    /// Stop accepting items and wake all waiters.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
