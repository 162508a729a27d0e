//! Controller RX buffer accounting
//!
//! Tracks how many bytes of the controller's serial receive buffer are
//! occupied by lines that were sent but not yet acknowledged. Every line
//! counts its text plus one terminator byte.

/// Byte budget of the controller RX buffer, with an optional cap on the
/// number of outstanding lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferAccountant {
    capacity: usize,
    used: usize,
    max_in_flight: Option<usize>,
    in_flight: usize,
}

impl BufferAccountant {
    /// Create an empty buffer of `capacity` bytes
    pub fn new(capacity: usize, max_in_flight: Option<usize>) -> Self {
        Self {
            capacity,
            used: 0,
            max_in_flight,
            in_flight: 0,
        }
    }

    /// Whether a line of `byte_length` bytes may be sent now
    pub fn can_send(&self, byte_length: usize) -> bool {
        let fits = self.used + byte_length <= self.capacity;
        let count_ok = self.max_in_flight.is_none_or(|max| self.in_flight < max);
        fits && count_ok
    }

    /// Whether a line of `byte_length` bytes could ever be sent
    pub fn fits_empty(&self, byte_length: usize) -> bool {
        byte_length <= self.capacity
    }

    /// Account for a line handed to the transport
    pub fn reserve(&mut self, byte_length: usize) {
        self.used += byte_length;
        self.in_flight += 1;
        tracing::trace!("Buffer reserve {} -> {}/{}", byte_length, self.used, self.capacity);
    }

    /// Free the bytes of an acknowledged line
    pub fn release(&mut self, byte_length: usize) {
        self.used = self.used.saturating_sub(byte_length);
        self.in_flight = self.in_flight.saturating_sub(1);
        tracing::trace!("Buffer release {} -> {}/{}", byte_length, self.used, self.capacity);
    }

    /// Forget everything outstanding (after a controller reset)
    pub fn reset(&mut self) {
        self.used = 0;
        self.in_flight = 0;
    }

    /// Change the byte budget
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Byte budget
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently occupied
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes still free
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }

    /// Lines currently outstanding
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
