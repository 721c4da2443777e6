//! Fixed-capacity byte buffer between the caller and the engine.

use crate::engine::Reader;
use crate::error::{Error, Result};

/// Bounded buffer of unread compressed bytes.
///
/// Unread bytes always occupy `storage[cursor..cursor + unread]`. Appends
/// first move them back to offset 0, so a write succeeds whenever the total
/// fits, regardless of how far reads have advanced the cursor.
pub struct StreamBuffer {
    storage: Box<[u8]>,
    cursor: usize,
    unread: usize,
}

impl StreamBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            unread: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of bytes appended but not yet read or consumed.
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Free space available to the next append.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.unread
    }

    pub fn is_empty(&self) -> bool {
        self.unread == 0
    }

    /// The unread bytes, in order.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.cursor..self.cursor + self.unread]
    }

    /// Append all of `data` or nothing.
    ///
    /// Fails with [`Error::Overflow`] when `unread + data.len()` would exceed
    /// the capacity; the buffer is left untouched in that case.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.remaining() {
            return Err(Error::Overflow {
                requested: data.len(),
                unread: self.unread,
                capacity: self.capacity(),
            });
        }

        if self.cursor != 0 {
            self.storage
                .copy_within(self.cursor..self.cursor + self.unread, 0);
            self.cursor = 0;
        }

        let end = self.unread + data.len();
        self.storage[self.unread..end].copy_from_slice(data);
        self.unread = end;
        Ok(())
    }

    /// Drop the first `n` unread bytes (clamped to what is available).
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.unread);
        self.cursor += n;
        self.unread -= n;
        if self.unread == 0 {
            self.cursor = 0;
        }
        n
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
        self.unread = 0;
    }
}

impl Reader for StreamBuffer {
    fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.unread);
        if n > 0 {
            dst[..n].copy_from_slice(&self.storage[self.cursor..self.cursor + n]);
            self.consume(n);
        }
        n
    }
}
