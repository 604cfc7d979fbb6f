//! Bounded drop-oldest frame queue.
//!
//! Single producer (acquisition thread), single consumer (control thread).
//! A full queue evicts its oldest entry: for a real-time control loop a
//! stale frame is worse than a lost one.

use std::time::{Duration, Instant};

use heapless::Deque;
use parking_lot::{Condvar, Mutex};

/// Default queue depth.
pub const QUEUE_CAPACITY: usize = 10;

/// Why [`FrameQueue::pop_timeout`] returned nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the wait.
    Timeout,
    /// The producer closed the queue and it is drained.
    Closed,
}

struct Slots<T, const N: usize> {
    items: Deque<T, N>,
    closed: bool,
    dropped: u64,
}

pub struct FrameQueue<T, const N: usize = QUEUE_CAPACITY> {
    slots: Mutex<Slots<T, N>>,
    ready: Condvar,
}

impl<T, const N: usize> Default for FrameQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> FrameQueue<T, N> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                items: Deque::new(),
                closed: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Enqueue `item`, returning the entry evicted to make room, if any.
    pub fn push(&self, item: T) -> Option<T> {
        let mut slots = self.slots.lock();
        let evicted = if slots.items.is_full() {
            slots.dropped += 1;
            slots.items.pop_front()
        } else {
            None
        };
        let rejected = slots.items.push_back(item).err();
        drop(slots);
        self.ready.notify_one();
        evicted.or(rejected)
    }

    /// Dequeue the oldest entry, waiting at most `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots.lock();
        loop {
            if let Some(item) = slots.items.pop_front() {
                return Ok(item);
            }
            if slots.closed {
                return Err(PopError::Closed);
            }
            if self.ready.wait_until(&mut slots, deadline).timed_out() {
                return match slots.items.pop_front() {
                    Some(item) => Ok(item),
                    None if slots.closed => Err(PopError::Closed),
                    None => Err(PopError::Timeout),
                };
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.slots.lock().items.pop_front()
    }

    /// Mark the producer side finished.  Queued entries can still be popped.
    pub fn close(&self) {
        self.slots.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    pub fn len(&self) -> usize {
        self.slots.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.slots.lock().dropped
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}
