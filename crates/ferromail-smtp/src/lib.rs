//! # ferromail-smtp
//!
//! An event-driven SMTP submission engine implementing RFC 5321.
//!
//! ## Features
//!
//! - **Sans-IO protocol core**: a [`Session`] state machine that owns no
//!   socket and can be driven by any transport
//! - **Full submission flow**: EHLO with HELO fallback, STARTTLS, AUTH,
//!   MAIL FROM, RCPT TO, DATA
//! - **TLS support**: both implicit TLS (port 465) and STARTTLS, via rustls
//! - **Authentication**: CRAM-MD5, LOGIN, PLAIN with automatic fallback
//! - **Queueing**: many messages per session over a single connection,
//!   delivered in submission order
//! - **Streaming content**: bodies go out in chunks, dot-stuffed
//!   transparently across chunk boundaries
//!
//! ## Quick Start
//!
//! ```ignore
//! use ferromail_smtp::{Address, MessageId, Outbox, OutboundMessage};
//! use ferromail_smtp::{Session, SessionConfig, connection};
//!
//! #[tokio::main]
//! async fn main() -> ferromail_smtp::Result<()> {
//!     let mut outbox = Outbox::new();
//!     outbox.insert(
//!         MessageId(1),
//!         OutboundMessage {
//!             sender: Some(Address::new("sender@example.com")?),
//!             to: vec![Address::new("recipient@example.com")?],
//!             cc: Vec::new(),
//!             bcc: Vec::new(),
//!             body: b"Subject: Test\r\n\r\nHello, World!\r\n".to_vec(),
//!         },
//!     );
//!
//!     let config = SessionConfig::new("smtp.example.com", 587)
//!         .credentials("sender@example.com", "password");
//!     let mut session = Session::new(config, outbox);
//!     session.submit(MessageId(1), false)?;
//!
//!     let delivered = connection::deliver(&mut session, |event| {
//!         println!("{event:?}");
//!     })
//!     .await;
//!     println!("delivered {delivered} message(s)");
//!     Ok(())
//! }
//! ```
//!
//! ## Event loop
//!
//! The session never blocks and never touches a socket. It hands out
//! actions and is fed transport events:
//!
//! ```text
//! ┌─────────────┐  Action::{Connect, Send, UpgradeTls, Close, Event}
//! │   Session   │ ──────────────────────────────────────────────────→ transport
//! │  (sans-IO)  │ ←──────────────────────────────────────────────────
//! └─────────────┘  on_bytes / on_send_complete / on_tls_upgraded / on_closed
//! ```
//!
//! [`connection::deliver`] is the bundled tokio transport; a test or an
//! alternative runtime can drive the same session by hand.
//!
//! ## Modules
//!
//! - [`auth`]: mechanism selection and SASL response encoding
//! - [`command`]: SMTP command composer
//! - [`connection`]: tokio transport driver
//! - [`parser`]: reply parser
//! - [`session`]: the protocol state machine and message queue
//! - [`stuffing`]: dot-stuffing content encoder
//! - [`types`]: addresses, capabilities, messages, reply codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod session;
pub mod stuffing;
pub mod types;

pub use auth::AuthPolicy;
pub use error::{Error, Result};
pub use session::{
    Action, CloseReason, MessageQueue, Phase, Security, Session, SessionConfig, SessionEvent,
};
pub use types::{
    Address, AuthMechanism, MessageId, MessageSource, Outbox, OutboundMessage, QueuedMessage,
    ReplyCode, ServerCaps,
};
