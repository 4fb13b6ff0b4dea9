use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// Single-slot lock-free mailbox between the decoder thread and the sampler.
///
/// The decoder publishes every frame it reads; a newer frame replaces an
/// unread older one, so the sampler always gets the most recent picture and
/// the decoder never blocks on a slow consumer.
pub struct LatestFrame<T> {
    slot: Arc<ArrayQueue<T>>,
}

impl<T> Clone for LatestFrame<T> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

impl<T> Default for LatestFrame<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestFrame<T> {
    pub fn new() -> Self {
        Self { slot: Arc::new(ArrayQueue::new(1)) }
    }

    /// Stores `frame`, returning the unread frame it displaced, if any.
    pub fn publish(&self, frame: T) -> Option<T> {
        self.slot.force_push(frame)
    }

    /// Takes the newest frame, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.slot.pop()
    }
}
