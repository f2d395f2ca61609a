use bytes::{Buf, BytesMut};
use thiserror::Error;

const INITIAL_CAPACITY: usize = 1024;

/// Errors returned by [`ByteQueue`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteQueueError {
    /// Attempted to discard more bytes than are buffered.
    #[error("cannot pop {requested} bytes, only {available} buffered")]
    PopOutOfRange { requested: usize, available: usize },
}

/// FIFO of not-yet-consumed bytes.
///
/// Bytes are appended at the back with [`push`](Self::push), inspected as one
/// contiguous slice with [`peek`](Self::peek) and discarded from the front with
/// [`pop`](Self::pop). The slice returned by `peek` borrows the queue, so it
/// cannot outlive the next mutation.
///
/// Storage is a `BytesMut`: popping advances the read cursor, and pushing
/// reclaims the consumed prefix before growing the allocation.
#[derive(Debug, Default)]
pub struct ByteQueue {
    buffer: BytesMut,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Appends `data` after the unconsumed region.
    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        // `reserve` compacts in place when the consumed prefix is large enough,
        // otherwise it grows the allocation geometrically.
        self.buffer.reserve(data.len());
        self.buffer.extend_from_slice(data);
    }

    /// Contiguous view of every unconsumed byte.
    #[inline]
    pub fn peek(&self) -> &[u8] {
        &self.buffer[..]
    }

    /// Discards the first `count` unconsumed bytes.
    pub fn pop(&mut self, count: usize) -> Result<(), ByteQueueError> {
        let available = self.buffer.len();
        if count > available {
            return Err(ByteQueueError::PopOutOfRange {
                requested: count,
                available,
            });
        }
        self.buffer.advance(count);
        Ok(())
    }

    /// Drops all buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
