//! Bounded in-memory parking lot for inbound events that could not be handled.
//!
//! Events end up here when they cannot be decoded, when the handler rejects them
//! permanently, or when transient failures outlast the retry policy. Nothing is
//! redelivered from here automatically; operators inspect or drain the queue.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A parked item with the reason it was parked.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter<T> {
    /// The item that failed
    pub payload: T,
    /// Why it failed
    pub error_message: String,
    /// Handling attempts made before parking
    pub attempts: usize,
    /// When it was parked
    pub parked_at: DateTime<Utc>,
}

/// Bounded FIFO dead-letter queue. Clones share the same storage.
///
/// When full, the oldest entry is dropped to make room.
///
/// # Example
///
/// ```
/// use campsite_runtime::dead_letter::DeadLetterQueue;
///
/// let dlq = DeadLetterQueue::new(2);
/// dlq.push("a", "bad payload".to_string(), 1);
/// dlq.push("b", "bad payload".to_string(), 1);
/// dlq.push("c", "bad payload".to_string(), 1);
///
/// let parked: Vec<_> = dlq.drain().into_iter().map(|d| d.payload).collect();
/// assert_eq!(parked, vec!["b", "c"]);
/// ```
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Create an empty queue holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DeadLetter<T>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park an item.
    pub fn push(&self, payload: T, error_message: String, attempts: usize) {
        let mut queue = self.lock();

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("dlq.dropped").increment(1);
            tracing::warn!(max_size = self.max_size, "Dead-letter queue full, dropping oldest entry");
        }

        tracing::warn!(attempts, error = %error_message, "Parking item in dead-letter queue");
        queue.push_back(DeadLetter {
            payload,
            error_message,
            attempts,
            parked_at: Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dlq.size").set(queue.len() as f64);
        metrics::counter!("dlq.pushed").increment(1);
    }

    /// Number of parked items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return every parked item, oldest first.
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let entries: Vec<_> = self.lock().drain(..).collect();
        metrics::gauge!("dlq.size").set(0.0);
        entries
    }

    /// Oldest parked item, if any.
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter<T>>
    where
        T: Clone,
    {
        self.lock().front().cloned()
    }

    /// Capacity of the queue.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keeps_fifo_order() {
        let dlq = DeadLetterQueue::new(10);
        dlq.push("first", "err".to_string(), 1);
        dlq.push("second", "err".to_string(), 4);

        let head = dlq.peek().unwrap();
        assert_eq!(head.payload, "first");
        assert_eq!(dlq.len(), 2);

        let drained = dlq.drain();
        assert_eq!(drained[1].payload, "second");
        assert_eq!(drained[1].attempts, 4);
        assert!(dlq.is_empty());
    }

    #[test]
    fn clones_share_storage() {
        let dlq = DeadLetterQueue::new(10);
        let handle = dlq.clone();
        handle.push(1_u32, "undecodable".to_string(), 1);
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let dlq = DeadLetterQueue::new(0);
        dlq.push("a", "err".to_string(), 1);
        dlq.push("b", "err".to_string(), 1);
        assert_eq!(dlq.max_size(), 1);
        assert_eq!(dlq.peek().unwrap().payload, "b");
    }
}
