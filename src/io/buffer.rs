//! Fixed-capacity cursor buffer shared by the engine drive loop and the stream adapters
//!
//! A [`CompressionBuffer`] owns (or borrows) a byte region of fixed length and
//! tracks two cursors into it:
//!
//! ```text
//! 0          pos             size            capacity
//! |  consumed  |    unread     |   unwritten    |
//! ```
//!
//! Writes land at `size`, reads leave from `pos`. Every operation is clamped to
//! what is available, so callers observe backpressure through short counts
//! rather than errors.
//!
//! # Compaction
//!
//! A read (or [`consume`](CompressionBuffer::consume)) that drains the buffer
//! resets both cursors to zero. Partial reads never move data; owners that
//! want to reclaim the consumed prefix call [`compact`](CompressionBuffer::compact)
//! explicitly. The decoding stream adapter does so before every refill.

/// Default buffer size for I/O operations (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Large buffer size for high-throughput operations (1MB)
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;

/// Small buffer size for memory-constrained scenarios (4KB)
pub const SMALL_BUFFER_SIZE: usize = 4 * 1024;

/// Byte region with independent read and write cursors
///
/// The storage is generic so the same cursor logic serves owned adapter
/// buffers (`Vec<u8>`) and borrowed caller memory (`&[u8]`, `&mut [u8]`).
///
/// # Examples
/// ```
/// use embeddenator_codec::CompressionBuffer;
///
/// let mut buffer = CompressionBuffer::with_capacity(8);
/// assert_eq!(buffer.write(b"hello world"), 8);
///
/// let mut out = [0u8; 5];
/// assert_eq!(buffer.read(&mut out), 5);
/// assert_eq!(&out, b"hello");
/// assert_eq!(buffer.available_read(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct CompressionBuffer<B = Vec<u8>> {
    buf: B,
    pos: usize,
    size: usize,
}

impl CompressionBuffer<Vec<u8>> {
    /// Create an empty owned buffer holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self::empty(vec![0u8; capacity])
    }
}

impl<B: AsRef<[u8]>> CompressionBuffer<B> {
    /// Wrap storage whose entire contents are unread data
    pub fn filled(buf: B) -> Self {
        let size = buf.as_ref().len();
        Self { buf, pos: 0, size }
    }

    /// Wrap storage with no readable data; all of it is write capacity
    pub fn empty(buf: B) -> Self {
        Self {
            buf,
            pos: 0,
            size: 0,
        }
    }

    /// Total capacity of the underlying region
    pub fn capacity(&self) -> usize {
        self.buf.as_ref().len()
    }

    /// Read cursor: offset of the next unread byte
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Write cursor: one past the last written byte
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes written but not yet read
    pub fn available_read(&self) -> usize {
        self.size - self.pos
    }

    /// Bytes that can still be written before the buffer is full
    pub fn available_write(&self) -> usize {
        self.capacity() - self.size
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.size
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    /// The unread window `[pos, size)`
    pub fn unread(&self) -> &[u8] {
        &self.buf.as_ref()[self.pos..self.size]
    }

    /// Copy up to `dst.len()` unread bytes into `dst`, returning the count
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.available_read());
        dst[..count].copy_from_slice(&self.buf.as_ref()[self.pos..self.pos + count]);
        self.consume(count);
        count
    }

    /// Mark `count` unread bytes as consumed without copying them
    ///
    /// Clamped to [`available_read`](Self::available_read). Returns the number
    /// of bytes actually consumed.
    pub fn consume(&mut self, count: usize) -> usize {
        let count = count.min(self.available_read());
        self.pos += count;
        if self.pos == self.size {
            self.pos = 0;
            self.size = 0;
        }
        count
    }

    /// Consume the wrapper and return the storage
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> CompressionBuffer<B> {
    /// Copy up to `src.len()` bytes at the write cursor, returning the count
    pub fn write(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.available_write());
        let start = self.size;
        self.buf.as_mut()[start..start + count].copy_from_slice(&src[..count]);
        self.size += count;
        count
    }

    /// The unwritten window `[size, capacity)`
    pub fn unwritten_mut(&mut self) -> &mut [u8] {
        let start = self.size;
        &mut self.buf.as_mut()[start..]
    }

    /// Mark `count` bytes of the unwritten window as written in place
    ///
    /// Clamped to [`available_write`](Self::available_write). Returns the
    /// number of bytes actually committed.
    pub fn commit(&mut self, count: usize) -> usize {
        let count = count.min(self.available_write());
        self.size += count;
        count
    }

    /// Shift the unread window to offset zero, reclaiming consumed space
    ///
    /// Idempotent; a no-op when nothing has been consumed.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        let unread = self.available_read();
        if unread > 0 {
            self.buf.as_mut().copy_within(self.pos..self.size, 0);
        }
        self.pos = 0;
        self.size = unread;
    }

    /// Drop all buffered data
    pub fn clear(&mut self) {
        self.pos = 0;
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_is_clamped_to_capacity() {
        let mut buffer = CompressionBuffer::with_capacity(4);
        assert_eq!(buffer.write(b"abcdef"), 4);
        assert!(buffer.is_full());
        assert_eq!(buffer.write(b"x"), 0);
        assert_eq!(buffer.unread(), b"abcd");
    }

    #[test]
    fn test_read_from_empty_returns_zero() {
        let mut buffer = CompressionBuffer::with_capacity(4);
        let mut out = [0u8; 4];
        assert_eq!(buffer.read(&mut out), 0);
    }

    #[test]
    fn test_draining_read_resets_cursors() {
        let mut buffer = CompressionBuffer::with_capacity(4);
        buffer.write(b"abcd");

        let mut out = [0u8; 4];
        assert_eq!(buffer.read(&mut out), 4);
        assert_eq!(buffer.pos(), 0);
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.available_write(), 4);
    }

    #[test]
    fn test_partial_read_does_not_move_data() {
        let mut buffer = CompressionBuffer::with_capacity(8);
        buffer.write(b"abcdefgh");

        let mut out = [0u8; 6];
        buffer.read(&mut out);
        assert_eq!(buffer.pos(), 6);
        assert_eq!(buffer.available_write(), 0);

        buffer.compact();
        assert_eq!(buffer.pos(), 0);
        assert_eq!(buffer.unread(), b"gh");
        assert_eq!(buffer.available_write(), 6);

        // Idempotent
        buffer.compact();
        assert_eq!(buffer.unread(), b"gh");
    }

    #[test]
    fn test_commit_and_consume_are_clamped() {
        let mut buffer = CompressionBuffer::with_capacity(4);
        buffer.unwritten_mut()[..2].copy_from_slice(b"xy");
        assert_eq!(buffer.commit(10), 4);
        assert_eq!(buffer.consume(10), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_borrowed_storage() {
        let data = b"borrowed";
        let mut src = CompressionBuffer::filled(&data[..]);
        assert_eq!(src.available_read(), 8);
        assert_eq!(src.available_write(), 0);

        let mut storage = [0u8; 8];
        let mut dst = CompressionBuffer::empty(&mut storage[..]);
        let n = dst.write(src.unread());
        src.consume(n);
        assert_eq!(dst.size(), 8);
        assert!(src.is_empty());
        assert_eq!(&storage, data);
    }

    #[test]
    fn test_clear() {
        let mut buffer = CompressionBuffer::with_capacity(4);
        buffer.write(b"ab");
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.available_write(), 4);
    }
}
