use std::ops::Range;

/// Capacity used by `CircularBuffer::default()`.
pub const DEFAULT_CAPACITY: usize = 5 * 1024;

/// Capacity substituted when `new` is asked for fewer than two bytes.
pub const FALLBACK_CAPACITY: usize = 512;

/// Fixed-capacity circular buffer for bytes.
///
/// The live region is `len` bytes starting at `read_pos`, wrapping modulo
/// `capacity`; `write_pos` always sits at `(read_pos + len) % capacity`.
/// No locking is done here: share it behind a mutex or keep a single owner.
#[derive(Debug)]
pub struct CircularBuffer {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
    capacity: usize,
}

/// Split the span of `n` bytes starting at `pos` into at most two ranges of
/// the backing region. The second range is empty unless the span wraps.
fn segments(pos: usize, n: usize, capacity: usize) -> (Range<usize>, Range<usize>) {
    if n <= capacity - pos {
        (pos..pos + n, 0..0)
    } else {
        let first_chunk = capacity - pos;
        (pos..capacity, 0..n - first_chunk)
    }
}

/// Cursor position after moving `n` bytes forward from `pos`.
fn advance(pos: usize, n: usize, capacity: usize) -> usize {
    let (first, second) = segments(pos, n, capacity);
    if second.is_empty() {
        if first.end == capacity {
            0
        } else {
            first.end
        }
    } else {
        second.end
    }
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity <= 1 { FALLBACK_CAPACITY } else { capacity };
        Self {
            buffer: vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
            len: 0,
            capacity,
        }
    }

    /// Grow the backing region to `new_capacity` bytes and return the
    /// resulting capacity. Capacity never shrinks: smaller requests are ignored.
    ///
    /// With `preserve_data` the live bytes are moved to the front of the new
    /// region in order; otherwise the buffer comes back empty. Either way the
    /// read cursor restarts at 0.
    pub fn grow_capacity(&mut self, new_capacity: usize, preserve_data: bool) -> usize {
        if new_capacity <= self.capacity {
            return self.capacity;
        }

        let mut grown = vec![0; new_capacity];
        if preserve_data && self.len > 0 {
            let copied = self.peek(&mut grown[..self.len]);
            debug_assert_eq!(copied, self.len);
            self.write_pos = self.len;
        } else {
            self.write_pos = 0;
            self.len = 0;
        }

        // The old region is dropped here.
        self.buffer = grown;
        self.read_pos = 0;
        self.capacity = new_capacity;
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_space(&self) -> usize {
        self.capacity - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Copy up to `dest.len()` bytes from the head of the buffer into `dest`
    /// without consuming them. Returns the number of bytes copied.
    pub fn peek(&self, dest: &mut [u8]) -> usize {
        let to_read = dest.len().min(self.len);
        if to_read == 0 {
            return 0;
        }

        let (first, second) = segments(self.read_pos, to_read, self.capacity);
        let first_chunk = first.len();
        dest[..first_chunk].copy_from_slice(&self.buffer[first]);
        dest[first_chunk..to_read].copy_from_slice(&self.buffer[second]);

        to_read
    }

    /// Move up to `dest.len()` bytes from the head of the buffer into `dest`.
    /// Asking for more than is buffered is not an error; check the count.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let read = self.peek(dest);
        self.consume(read);
        read
    }

    /// Drop up to `count` bytes from the head of the buffer without copying.
    pub fn skip(&mut self, count: usize) -> usize {
        let to_skip = count.min(self.len);
        self.consume(to_skip);
        to_skip
    }

    fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.read_pos = advance(self.read_pos, n, self.capacity);
        self.len -= n;
    }

    /// Take up to `count` bytes from the buffer
    pub fn take(&mut self, count: usize) -> Vec<u8> {
        let mut result = vec![0; count.min(self.len)];
        self.read(&mut result);
        result
    }

    /// Append bytes to the buffer and return how many were stored.
    ///
    /// Without `overlap`, bytes that do not fit in the free space are
    /// dropped. With `overlap`, the oldest buffered bytes are evicted to make
    /// room, and when `data` is longer than the whole buffer only its last
    /// `capacity` bytes are kept.
    pub fn write(&mut self, data: &[u8], overlap: bool) -> usize {
        if data.is_empty() {
            return 0;
        }

        let data = if overlap {
            let free = self.available_space();
            if data.len() > free {
                self.skip(data.len() - free);
            }
            if data.len() > self.capacity {
                &data[data.len() - self.capacity..]
            } else {
                data
            }
        } else {
            &data[..data.len().min(self.available_space())]
        };

        let to_add = data.len();
        if to_add == 0 {
            return 0;
        }

        let (first, second) = segments(self.write_pos, to_add, self.capacity);
        let first_chunk = first.len();
        self.buffer[first].copy_from_slice(&data[..first_chunk]);
        self.buffer[second].copy_from_slice(&data[first_chunk..]);

        self.write_pos = advance(self.write_pos, to_add, self.capacity);
        self.len += to_add;
        to_add
    }

    /// Forget all buffered bytes. The backing region keeps its contents.
    pub fn clear(&mut self) {
        self.len = 0;
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Replace this buffer's state with a snapshot of `other`.
    ///
    /// The capacity is matched to `other` and its live bytes land at offset 0.
    pub fn assign(&mut self, other: &CircularBuffer) {
        if self.capacity != other.capacity {
            self.buffer.resize(other.capacity, 0);
            self.capacity = other.capacity;
        }

        let copied = other.peek(&mut self.buffer[..other.len]);
        debug_assert_eq!(copied, other.len);

        self.read_pos = 0;
        self.len = other.len;
        self.write_pos = if other.len == self.capacity { 0 } else { other.len };
    }

    /// Exchange the whole state of two buffers without copying any bytes.
    pub fn swap(&mut self, other: &mut CircularBuffer) {
        std::mem::swap(self, other);
    }
}

impl Default for CircularBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Clone for CircularBuffer {
    fn clone(&self) -> Self {
        let mut copy = Self {
            buffer: Vec::new(),
            read_pos: 0,
            write_pos: 0,
            len: 0,
            capacity: 0,
        };
        copy.assign(self);
        copy
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}
