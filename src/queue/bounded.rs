use parking_lot::{Condvar, Mutex};

use crate::queue::ThreadSafeQueue;
use crate::record::Record;

struct Ring {
    slots: Vec<Option<Record>>,
    head: usize,
    tail: usize,
    count: usize,
    stop: bool,
}

/// Fixed-capacity blocking ring. `push` blocks while full, `pop` blocks
/// while empty; `shutdown` releases both sides.
pub struct BoundedQueue {
    ring: Mutex<Ring>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded queue capacity must be positive");
        BoundedQueue {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                count: 0,
                stop: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ThreadSafeQueue for BoundedQueue {
    #[allow(unused_mut)]
    fn push(&self, mut record: Record) {
        {
            let mut ring = self.ring.lock();
            while ring.count == self.capacity && !ring.stop {
                self.not_full.wait(&mut ring);
            }
            if ring.stop {
                return;
            }
            #[cfg(feature = "sequence-tracking")]
            {
                record.sequence = crate::queue::next_sequence();
            }
            let tail = ring.tail;
            ring.slots[tail] = Some(record);
            ring.tail = (tail + 1) % self.capacity;
            ring.count += 1;
        }
        self.not_empty.notify_one();
    }

    fn pop(&self) -> Option<Record> {
        let record = {
            let mut ring = self.ring.lock();
            while ring.count == 0 && !ring.stop {
                self.not_empty.wait(&mut ring);
            }
            if ring.count == 0 {
                return None;
            }
            let head = ring.head;
            let record = ring.slots[head].take();
            ring.head = (head + 1) % self.capacity;
            ring.count -= 1;
            record
        };
        self.not_full.notify_one();
        record
    }

    fn try_pop(&self) -> Option<Record> {
        let record = {
            let mut ring = self.ring.lock();
            if ring.count == 0 {
                return None;
            }
            let head = ring.head;
            let record = ring.slots[head].take();
            ring.head = (head + 1) % self.capacity;
            ring.count -= 1;
            record
        };
        self.not_full.notify_one();
        record
    }

    fn len(&self) -> usize {
        self.ring.lock().count
    }

    fn shutdown(&self) {
        {
            let mut ring = self.ring.lock();
            ring.stop = true;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}
