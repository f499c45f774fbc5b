use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::config::{
    DEFAULT_LARGE_BUFFER_SIZE, DEFAULT_LARGE_POOL_SIZE, DEFAULT_MEDIUM_BUFFER_SIZE,
    DEFAULT_MEDIUM_POOL_SIZE, DEFAULT_SMALL_BUFFER_SIZE, DEFAULT_SMALL_POOL_SIZE,
};
use crate::memory::Buffer;

/// Slot counts and size-class capacities for a [`BufferPool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub small_buffer_size: usize,
    pub medium_buffer_size: usize,
    pub large_buffer_size: usize,
    pub small_pool_size: usize,
    pub medium_pool_size: usize,
    pub large_pool_size: usize,
}

impl Default for PoolSizing {
    fn default() -> Self {
        PoolSizing {
            small_buffer_size: DEFAULT_SMALL_BUFFER_SIZE as usize,
            medium_buffer_size: DEFAULT_MEDIUM_BUFFER_SIZE as usize,
            large_buffer_size: DEFAULT_LARGE_BUFFER_SIZE as usize,
            small_pool_size: DEFAULT_SMALL_POOL_SIZE as usize,
            medium_pool_size: DEFAULT_MEDIUM_POOL_SIZE as usize,
            large_pool_size: DEFAULT_LARGE_POOL_SIZE as usize,
        }
    }
}

/// Fixed slot array of preallocated buffers of one capacity class.
///
/// Invariant: outstanding + pooled = pool_size. A released buffer either
/// finds a free slot or is rejected back to the caller (who drops it).
struct SlotPool {
    slots: Mutex<Vec<Option<Buffer>>>,
    cursor: AtomicUsize,
    buffer_size: usize,
    pool_size: usize,
}

impl SlotPool {
    fn new(pool_size: usize, buffer_size: usize) -> Self {
        let slots = (0..pool_size)
            .map(|_| Some(Buffer::with_capacity(buffer_size)))
            .collect();
        SlotPool {
            slots: Mutex::new(slots),
            cursor: AtomicUsize::new(0),
            buffer_size,
            pool_size,
        }
    }

    fn try_acquire(&self) -> Option<Buffer> {
        let mut slots = self.slots.lock();
        for _ in 0..self.pool_size {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool_size;
            if let Some(mut buffer) = slots[idx].take() {
                buffer.clear();
                return Some(buffer);
            }
        }
        None
    }

    fn try_release(&self, buffer: Buffer) -> Result<(), Buffer> {
        if buffer.capacity() != self.buffer_size {
            return Err(buffer);
        }

        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(buffer);
                return Ok(());
            }
        }
        Err(buffer)
    }

    fn available(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }
}

/// Three size-class buffer pools with heap fallback for oversize requests.
///
/// Pool exhaustion is not an error: `acquire` falls back to a fresh heap
/// buffer of the exact requested size, which is dropped again on release
/// because its capacity matches no band.
pub struct BufferPool {
    small: SlotPool,
    medium: SlotPool,
    large: SlotPool,
}

impl BufferPool {
    pub fn new(sizing: PoolSizing) -> Self {
        BufferPool {
            small: SlotPool::new(sizing.small_pool_size, sizing.small_buffer_size),
            medium: SlotPool::new(sizing.medium_pool_size, sizing.medium_buffer_size),
            large: SlotPool::new(sizing.large_pool_size, sizing.large_buffer_size),
        }
    }

    /// Exclusive ownership of a buffer with capacity >= `required_size`,
    /// with `len() == 0`. Never fails.
    pub fn acquire(&self, required_size: usize) -> Buffer {
        let pooled = if required_size <= self.small.buffer_size {
            self.small.try_acquire()
        } else if required_size <= self.medium.buffer_size {
            self.medium.try_acquire()
        } else if required_size <= self.large.buffer_size {
            self.large.try_acquire()
        } else {
            None
        };

        pooled.unwrap_or_else(|| Buffer::with_capacity(required_size))
    }

    /// Return a buffer to the pool of matching capacity. Buffers whose
    /// capacity matches no band, or whose pool has no free slot, are
    /// dropped here.
    pub fn release(&self, buffer: Buffer) {
        let rejected = if buffer.capacity() == self.small.buffer_size {
            self.small.try_release(buffer)
        } else if buffer.capacity() == self.medium.buffer_size {
            self.medium.try_release(buffer)
        } else if buffer.capacity() == self.large.buffer_size {
            self.large.try_release(buffer)
        } else {
            Err(buffer)
        };
        drop(rejected);
    }

    pub fn total_buffers(&self) -> usize {
        self.small.pool_size + self.medium.pool_size + self.large.pool_size
    }

    pub fn available_buffers(&self) -> usize {
        self.small.available() + self.medium.available() + self.large.available()
    }
}
