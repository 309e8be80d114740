//! Pending-message queue.

use std::collections::VecDeque;

use crate::error::Result;
use crate::types::{MessageId, QueuedMessage};

/// FIFO queue of messages waiting for transfer.
///
/// Holds only `(id, anonymous)` handles; the body is prepared lazily when
/// a message reaches the head, so the freshest version is sent.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
}

impl MessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a message unless its id is already queued.
    ///
    /// Returns `false` for a duplicate (the queue is unchanged).
    ///
    /// # Errors
    ///
    /// Returns a queue-allocation error if space cannot be reserved; the
    /// queue keeps its previous contents.
    pub fn push(&mut self, entry: QueuedMessage) -> Result<bool> {
        if self.contains(entry.id) {
            return Ok(false);
        }
        self.entries.try_reserve(1)?;
        self.entries.push_back(entry);
        Ok(true)
    }

    /// Removes and returns the queue head.
    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    /// Returns a popped entry to the queue head.
    ///
    /// Used when a session ends with its in-flight message unresolved:
    /// the message keeps its place ahead of anything submitted later.
    /// No-op if the id is queued again in the meantime.
    ///
    /// # Errors
    ///
    /// Returns a queue-allocation error if space cannot be reserved; the
    /// queue keeps its previous contents.
    pub fn restore(&mut self, entry: QueuedMessage) -> Result<()> {
        if self.contains(entry.id) {
            return Ok(());
        }
        self.entries.try_reserve(1)?;
        self.entries.push_front(entry);
        Ok(())
    }

    /// Returns true if the id is queued.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all queued messages.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
