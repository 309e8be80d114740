//! Core SMTP types.

mod address;
mod capability;
mod message;
mod reply;

pub use address::Address;
pub use capability::{AuthMechanism, ServerCaps};
pub use message::{MessageId, MessageSource, Outbox, OutboundMessage, QueuedMessage};
pub use reply::ReplyCode;
