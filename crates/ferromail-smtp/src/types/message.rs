//! Outbound message types and the message source seam.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::Address;

/// Identifier for a message held by a [`MessageSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue entry: which message to send and whether to hide the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Message identifier.
    pub id: MessageId,
    /// Send with the placeholder sender instead of the real one.
    pub anonymous: bool,
}

/// A fully prepared outbound message: detached envelope plus serialized body.
///
/// Address lists are snapshots and the body is an immutable byte buffer,
/// so mutation of the caller's original message cannot race with an
/// in-flight send.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    /// Envelope sender, if the message has one.
    pub sender: Option<Address>,
    /// To recipients.
    pub to: Vec<Address>,
    /// Cc recipients.
    pub cc: Vec<Address>,
    /// Bcc recipients.
    pub bcc: Vec<Address>,
    /// Serialized RFC 822 body, headers included.
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Total number of envelope recipients.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Returns true if the message has at least one recipient.
    #[must_use]
    pub fn has_recipients(&self) -> bool {
        self.recipient_count() > 0
    }
}

/// Source of prepared messages, keyed by id.
///
/// The session queues only `(id, anonymous)` pairs and asks the source to
/// prepare each message right before it is sent, so the freshest version
/// is transferred. Header folding, MIME and charset concerns all live
/// behind this seam.
pub trait MessageSource {
    /// Prepares the message for transfer.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be produced; the session
    /// skips it and moves on to the next queued message.
    fn prepare(&mut self, id: MessageId, anonymous: bool) -> Result<OutboundMessage>;
}

/// In-memory [`MessageSource`] backed by a map.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: HashMap<MessageId, OutboundMessage>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message under the given id, replacing any previous one.
    pub fn insert(&mut self, id: MessageId, message: OutboundMessage) {
        self.messages.insert(id, message);
    }

    /// Number of messages held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the outbox holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageSource for Outbox {
    fn prepare(&mut self, id: MessageId, _anonymous: bool) -> Result<OutboundMessage> {
        self.messages
            .get(&id)
            .cloned()
            .ok_or(Error::MessageUnavailable { id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_recipient_count() {
        let message = OutboundMessage {
            sender: None,
            to: vec![addr("a@example.com"), addr("b@example.com")],
            cc: vec![addr("c@example.com")],
            bcc: vec![addr("d@example.com")],
            body: Vec::new(),
        };
        assert_eq!(message.recipient_count(), 4);
        assert!(message.has_recipients());
    }

    #[test]
    fn test_no_recipients() {
        let message = OutboundMessage::default();
        assert_eq!(message.recipient_count(), 0);
        assert!(!message.has_recipients());
    }

    #[test]
    fn test_outbox_prepare() {
        let mut outbox = Outbox::new();
        outbox.insert(
            MessageId(7),
            OutboundMessage {
                to: vec![addr("a@example.com")],
                body: b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
                ..OutboundMessage::default()
            },
        );

        let prepared = outbox.prepare(MessageId(7), false).unwrap();
        assert_eq!(prepared.to.len(), 1);
        assert!(!prepared.body.is_empty());
    }

    #[test]
    fn test_outbox_missing_message() {
        let mut outbox = Outbox::new();
        assert!(outbox.prepare(MessageId(1), false).is_err());
    }
}
