//! # Frame Buffer Module
//!
//! A reusable byte store for one decoded frame's pixel payload. The stream
//! processor keeps a single buffer for its whole lifetime and overwrites it
//! with every frame, so allocation only happens when a larger frame shows up.
//!
//! ## Growth policy
//!
//! When the required size exceeds the current capacity, the buffer is
//! reallocated to twice the required size and the old contents are dropped.
//! Capacity never shrinks.
//!
//! ```rust
//! use stream_scan::core::frame_buffer::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! assert_eq!(buffer.capacity(), 0);
//!
//! buffer.ensure_capacity(640 * 480 * 3);
//! assert_eq!(buffer.capacity(), 2 * 640 * 480 * 3);
//!
//! // Smaller frames reuse the existing allocation
//! buffer.ensure_capacity(320 * 240 * 3);
//! assert_eq!(buffer.capacity(), 2 * 640 * 480 * 3);
//! ```

/// Growable byte store reused across frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    /// Backing storage; its length is the usable capacity
    storage: Vec<u8>,
    /// Number of bytes written by the last copy
    len: usize,
    /// Number of reallocations performed so far
    grows: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with room for `capacity` bytes up front.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity],
            len: 0,
            grows: 0,
        }
    }

    /// Makes sure at least `required` bytes fit.
    ///
    /// Reallocates to `2 * required` when the current capacity is too small and
    /// discards the previous contents. Does nothing otherwise.
    pub fn ensure_capacity(&mut self, required: usize) {
        if self.storage.len() >= required {
            return;
        }
        let target = required.saturating_mul(2);
        self.storage = vec![0u8; target];
        self.len = 0;
        self.grows += 1;
    }

    /// Copies a frame payload into the buffer, growing it first if needed.
    ///
    /// Returns the slice holding the copied payload.
    pub fn copy_from(&mut self, payload: &[u8]) -> &[u8] {
        self.ensure_capacity(payload.len());
        self.storage[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        &self.storage[..self.len]
    }

    /// Payload written by the last [`copy_from`](Self::copy_from).
    pub fn payload(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// How many times the buffer has been reallocated.
    pub fn grow_count(&self) -> u64 {
        self.grows
    }
}
