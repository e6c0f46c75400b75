/// Fixed-capacity circular buffer.
///
/// Not synchronized; wrap in `parking_lot::Mutex` for cross-thread access.
///
/// Overflow behavior: drops the oldest entry.
#[derive(Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            buffer: (0..capacity).map(|_| None).collect(),
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        }
    }

    /// Append one entry, returning the oldest entry if it had to be dropped.
    pub fn push(&mut self, item: T) -> Option<T> {
        let dropped = if self.available == self.capacity {
            let oldest = self.buffer[self.read_index].take();
            self.read_index = (self.read_index + 1) % self.capacity;
            self.available -= 1;
            oldest
        } else {
            None
        };

        self.buffer[self.write_index] = Some(item);
        self.write_index = (self.write_index + 1) % self.capacity;
        self.available += 1;
        dropped
    }

    /// Oldest entry, without removing it.
    pub fn front(&self) -> Option<&T> {
        if self.available == 0 {
            return None;
        }
        self.buffer[self.read_index].as_ref()
    }

    /// Remove and return the oldest entry.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.available == 0 {
            return None;
        }
        let item = self.buffer[self.read_index].take();
        self.read_index = (self.read_index + 1) % self.capacity;
        self.available -= 1;
        item
    }

    /// Read and remove up to `count` entries, oldest first.
    pub fn read(&mut self, count: usize) -> Vec<T> {
        let to_read = count.min(self.available);
        let mut result = Vec::with_capacity(to_read);
        for _ in 0..to_read {
            if let Some(item) = self.pop_front() {
                result.push(item);
            }
        }
        result
    }

    /// Number of entries currently available for reading.
    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Reset the buffer to empty state.
    pub fn reset(&mut self) {
        for slot in &mut self.buffer {
            *slot = None;
        }
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
