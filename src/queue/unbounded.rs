use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::queue::ThreadSafeQueue;
use crate::record::Record;

struct Inner {
    queue: VecDeque<Record>,
    stop: bool,
}

/// Unbounded mutex/condvar queue. `push` never blocks.
pub struct UnboundedQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl UnboundedQueue {
    pub fn new() -> Self {
        UnboundedQueue {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                stop: false,
            }),
            not_empty: Condvar::new(),
        }
    }
}

impl Default for UnboundedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadSafeQueue for UnboundedQueue {
    #[allow(unused_mut)]
    fn push(&self, mut record: Record) {
        {
            let mut inner = self.inner.lock();
            if inner.stop {
                return;
            }
            #[cfg(feature = "sequence-tracking")]
            {
                record.sequence = crate::queue::next_sequence();
            }
            inner.queue.push_back(record);
        }
        self.not_empty.notify_one();
    }

    fn pop(&self) -> Option<Record> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(record) = inner.queue.pop_front() {
                return Some(record);
            }
            if inner.stop {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    fn try_pop(&self) -> Option<Record> {
        self.inner.lock().queue.pop_front()
    }

    fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stop = true;
        }
        self.not_empty.notify_all();
    }
}
