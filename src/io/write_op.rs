use std::collections::HashMap;

use crate::memory::Buffer;

/// Continuation state for one outstanding submission.
///
/// Owns the buffer whose bytes the kernel is writing and remembers how many
/// log records those bytes carry. Resumed exactly once, by the completion
/// processor on the worker thread.
pub struct WriteOp {
    buffer: Buffer,
    record_count: usize,
}

impl WriteOp {
    pub fn new(buffer: Buffer, record_count: usize) -> Self {
        WriteOp {
            buffer,
            record_count,
        }
    }

    pub fn submitted_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

/// Registry of outstanding writes, keyed by the opaque token passed through
/// the ring. Tokens increase monotonically and are never reused while their
/// write is outstanding.
pub struct InFlightTable {
    ops: HashMap<u64, WriteOp>,
    next_token: u64,
}

impl InFlightTable {
    pub fn new() -> Self {
        InFlightTable {
            ops: HashMap::new(),
            next_token: 1,
        }
    }

    pub fn insert(&mut self, op: WriteOp) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.ops.insert(token, op);
        token
    }

    pub fn take(&mut self, token: u64) -> Option<WriteOp> {
        self.ops.remove(&token)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = WriteOp> + '_ {
        self.ops.drain().map(|(_, op)| op)
    }
}

impl Default for InFlightTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_resumed_once() {
        let mut table = InFlightTable::new();
        let first = table.insert(WriteOp::new(Buffer::with_capacity(8), 1));
        let second = table.insert(WriteOp::new(Buffer::with_capacity(8), 2));
        assert_ne!(first, second);
        assert_eq!(table.len(), 2);

        let op = table.take(first).unwrap();
        assert_eq!(op.record_count(), 1);
        assert!(table.take(first).is_none());
        assert_eq!(table.len(), 1);
    }
}
