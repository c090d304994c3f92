/// A fixed-capacity byte ring with a read offset and a fill count.
///
/// Used on both sides of a TCP connection. On the send side, data is appended by the application,
/// peeked at arbitrary offsets for (re)transmission and only removed once acknowledged. On the
/// receive side, segment data behind a gap is placed at an offset past the committed bytes and
/// only becomes readable when a write in order covers it again.
///
/// At all times `len() + free() == capacity()`.
#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[u8]>,
    /// Position of the oldest byte.
    read_at: usize,
    /// Number of committed bytes.
    count: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            data: vec![0; capacity].into_boxed_slice(),
            read_at: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of committed bytes.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of bytes that can still be committed.
    pub fn free(&self) -> usize {
        self.capacity() - self.count
    }

    /// Drop all content.
    pub fn clear(&mut self) {
        self.read_at = 0;
        self.count = 0;
    }

    fn wrap(&self, pos: usize) -> usize {
        match self.capacity() {
            0 => 0,
            cap => pos % cap,
        }
    }

    /// Copy `src` into the ring starting `pos` bytes after the read position.
    fn copy_in(&mut self, pos: usize, src: &[u8]) {
        let start = self.wrap(self.read_at + pos);
        let first = src.len().min(self.capacity() - start);
        self.data[start..start + first].copy_from_slice(&src[..first]);
        self.data[..src.len() - first].copy_from_slice(&src[first..]);
    }

    /// Copy out of the ring starting `pos` bytes after the read position.
    fn copy_out(&self, pos: usize, dst: &mut [u8]) {
        let start = self.wrap(self.read_at + pos);
        let first = dst.len().min(self.capacity() - start);
        dst[..first].copy_from_slice(&self.data[start..start + first]);
        let rest = dst.len() - first;
        dst[first..].copy_from_slice(&self.data[..rest]);
    }

    /// Append as much of `src` as fits, committing it. Returns the number of bytes taken.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let size = src.len().min(self.free());
        self.copy_in(self.count, &src[..size]);
        self.count += size;
        size
    }

    /// Place `src` at `offset` bytes past the committed data without committing it.
    ///
    /// Bytes beyond the free space are dropped. Returns the number of bytes placed.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) -> usize {
        let free = self.free();
        if offset >= free {
            return 0;
        }
        let size = src.len().min(free - offset);
        self.copy_in(self.count + offset, &src[..size]);
        size
    }

    /// Copy committed bytes starting at `offset` without consuming them.
    pub fn peek(&self, offset: usize, dst: &mut [u8]) -> usize {
        if offset >= self.count {
            return 0;
        }
        let size = dst.len().min(self.count - offset);
        self.copy_out(offset, &mut dst[..size]);
        size
    }

    /// Copy and consume committed bytes from the front.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let size = self.peek(0, dst);
        self.remove(size)
    }

    /// Consume up to `size` bytes from the front without copying them.
    pub fn remove(&mut self, size: usize) -> usize {
        let size = size.min(self.count);
        self.read_at = self.wrap(self.read_at + size);
        self.count -= size;
        size
    }
}
