/// Dequeue from an empty queue
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Underflow;

/// Bounded FIFO over a fixed ring of slots
///
/// Invariant: `count <= N`. The write position is `(read_index + count) % N`.
pub struct CircularQueue<T, const N: usize> {
    slots: [Option<T>; N],
    read_index: usize,
    count: usize,
}

impl<T, const N: usize> CircularQueue<T, N> {
    const _ASSERT: usize = N - 1;

    pub const fn new() -> Self {
        let _ = Self::_ASSERT;
        Self {
            slots: [const { None }; N],
            read_index: 0,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    /// Appends an item, handing it back if the queue is full
    pub fn enqueue(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let idx = (self.read_index + self.count) % N;
        self.slots[idx] = Some(item);
        self.count += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Result<T, Underflow> {
        if self.is_empty() {
            return Err(Underflow);
        }
        let item = unwrap!(self.slots[self.read_index].take());
        self.read_index = (self.read_index + 1) % N;
        self.count -= 1;
        Ok(item)
    }

    /// Drops all queued items
    pub fn clear(&mut self) {
        while self.dequeue().is_ok() {}
        self.read_index = 0;
    }
}

impl<T, const N: usize> Default for CircularQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
