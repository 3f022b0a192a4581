//! Growable byte buffer with a read/write cursor

use super::{Decode, Encode};

/// Byte store with a single cursor shared by reads and writes.
///
/// Writes land at the cursor, overwriting or extending the backing vector, and
/// advance it. Reads are bounds-checked against the current length and leave
/// the cursor untouched when too few bytes remain. Offset and length can be
/// moved independently so a caller can reserve a header, write a body, then
/// seek back and fill the header in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl ByteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity), offset: 0 }
    }

    /// Wrap existing bytes; the cursor starts at zero.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { data: bytes.into(), offset: 0 }
    }

    /// All bytes currently held, independent of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Move the cursor. Positions past the end are allowed; a later write
    /// zero-fills the gap and a later read fails.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Truncate or zero-extend the stored bytes. The cursor is not moved.
    pub fn set_length(&mut self, length: usize) {
        self.data.resize(length, 0);
    }

    /// Bytes between the cursor and the end.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// Drop all content and rewind.
    pub fn clear(&mut self) {
        self.data.clear();
        self.offset = 0;
    }

    /// Copy raw bytes in at the cursor.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
    }

    /// Take `count` raw bytes from the cursor, or `None` if fewer remain.
    pub fn read_bytes(&mut self, count: usize) -> Option<&[u8]> {
        let start = self.offset;
        let end = start.checked_add(count)?;
        if end > self.data.len() {
            return None;
        }
        self.offset = end;
        Some(&self.data[start..end])
    }

    /// Advance past `count` bytes without interpreting them.
    pub fn skip(&mut self, count: usize) -> Option<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Encode `value` at the cursor.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) {
        value.encode(self);
    }

    /// Decode a `T` from the cursor.
    pub fn read<T: Decode>(&mut self) -> Option<T> {
        T::decode(self)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}
