//! Fixed-capacity circular (ring) buffer for `f32` audio samples.
//!
//! When the buffer is full, new samples **overwrite** the oldest data so that
//! the most-recent `capacity` samples are always available.  The streaming
//! recognizer cares about the tail of the capture stream, not the head: every
//! tick it reads the newest N-sample window with [`RingBuffer::latest`]
//! without disturbing the buffer.
//!
//! # Example
//!
//! ```rust
//! use voicecmd::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 items → capacity 4 → oldest dropped
//! assert_eq!(buf.latest(2), vec![4.0, 5.0]);
//! let data = buf.drain();
//! assert_eq!(data, vec![2.0, 3.0, 4.0, 5.0]);
//! ```

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular buffer.
///
/// Generic over `T: Copy + Default` so it can store any `Copy` scalar, though
/// the recognition pipeline uses `RingBuffer<f32>` exclusively.
///
/// ## Overflow behaviour
///
/// When [`push_slice`](Self::push_slice) would exceed `capacity`, the oldest
/// samples are silently overwritten.  The buffer never allocates beyond its
/// initial capacity.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    /// Append `data` to the buffer.
    ///
    /// If the total number of samples exceeds `capacity`, the oldest samples
    /// are overwritten (circular behaviour).
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.buf[self.write_pos] = item;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            if self.len < self.capacity {
                self.len += 1;
            }
        }
    }

    /// Copy out the most recent `n` samples in chronological order without
    /// modifying the buffer.
    ///
    /// When fewer than `n` samples are stored, everything available is
    /// returned (possibly an empty vector).
    pub fn latest(&self, n: usize) -> Vec<T> {
        let take = n.min(self.len);
        if take == 0 {
            return Vec::new();
        }

        // Index of the oldest valid sample.
        let read_pos = if self.len < self.capacity {
            0
        } else {
            self.write_pos
        };
        // Skip forward so that exactly `take` newest samples remain.
        let skip = self.len - take;

        let mut result = Vec::with_capacity(take);
        for i in 0..take {
            result.push(self.buf[(read_pos + skip + i) % self.capacity]);
        }
        result
    }

    /// Drain all stored samples in chronological order and reset the buffer.
    ///
    /// After this call `len() == 0`.
    pub fn drain(&mut self) -> Vec<T> {
        let out = self.latest(self.len);
        self.clear();
        out
    }

    /// Discard all samples and reset the write position.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` when the buffer has been filled to capacity at least
    /// once (i.e. overflow would occur on the next push).
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Current buffered duration in seconds, assuming `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
