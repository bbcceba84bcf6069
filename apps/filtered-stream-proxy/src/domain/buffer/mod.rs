//! Bounded Ring Buffer
//!
//! Fixed-capacity FIFO used to hold the most recent stream items of a
//! session. When full, adding an item evicts the oldest one.
//!
//! One writer (the session's stream task) and many readers (poll handlers)
//! share the buffer; `snapshot` clones the contents under a read lock and
//! never mutates them.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use parking_lot::RwLock;

/// Errors constructing a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Capacity must be at least one.
    #[error("ring buffer capacity must be greater than zero")]
    ZeroCapacity,
}

/// Bounded FIFO container.
///
/// # Example
///
/// ```rust
/// use filtered_stream_proxy::domain::buffer::RingBuffer;
///
/// let buffer = RingBuffer::new(3).unwrap();
/// for item in ["A", "B", "C", "D"] {
///     buffer.add(item);
/// }
/// assert_eq!(buffer.snapshot(), vec!["B", "C", "D"]);
/// ```
#[derive(Debug)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: RwLock<VecDeque<T>>,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns `BufferError::ZeroCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or(BufferError::ZeroCapacity)
    }

    /// Create an empty buffer from an already validated capacity.
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: capacity.get(),
            items: RwLock::new(VecDeque::with_capacity(capacity.get())),
        }
    }

    /// Append an item at the tail.
    ///
    /// Returns the item evicted from the head if the buffer was full.
    pub fn add(&self, item: T) -> Option<T> {
        let mut items = self.items.write();
        items.push_back(item);

        if items.len() > self.capacity {
            items.pop_front()
        } else {
            None
        }
    }

    /// Maximum number of items held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether the buffer holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Drop every buffered item.
    pub fn clear(&self) {
        self.items.write().clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_capacity_rejected() {
        let result = RingBuffer::<u32>::new(0);
        assert_eq!(result.unwrap_err(), BufferError::ZeroCapacity);
    }

    #[test]
    fn keeps_last_items_in_order() {
        let buffer = RingBuffer::new(3).unwrap();

        assert_eq!(buffer.add('A'), None);
        assert_eq!(buffer.add('B'), None);
        assert_eq!(buffer.add('C'), None);
        assert_eq!(buffer.add('D'), Some('A'));

        assert_eq!(buffer.snapshot(), vec!['B', 'C', 'D']);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn snapshot_does_not_drain() {
        let buffer = RingBuffer::new(2).unwrap();
        buffer.add(1);

        assert_eq!(buffer.snapshot(), vec![1]);
        assert_eq!(buffer.snapshot(), vec![1]);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn clear_empties_buffer() {
        let buffer = RingBuffer::new(2).unwrap();
        buffer.add(1);
        buffer.add(2);
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn concurrent_snapshots_stay_bounded() {
        let buffer = Arc::new(RingBuffer::new(8).unwrap());

        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    buffer.add(i);
                }
            })
        };

        for _ in 0..1_000 {
            let snapshot = buffer.snapshot();
            assert!(snapshot.len() <= 8);
            assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
        }

        writer.join().unwrap();
        assert_eq!(buffer.snapshot(), (9_992..10_000).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn overflow_keeps_exactly_last_capacity_items(
            capacity in 1usize..32,
            items in proptest::collection::vec(any::<u16>(), 0..128),
        ) {
            let buffer = RingBuffer::new(capacity).unwrap();
            for item in &items {
                buffer.add(*item);
            }

            let expected: Vec<u16> = items
                .iter()
                .skip(items.len().saturating_sub(capacity))
                .copied()
                .collect();

            prop_assert_eq!(buffer.snapshot(), expected);
            prop_assert!(buffer.len() <= capacity);
        }
    }
}
