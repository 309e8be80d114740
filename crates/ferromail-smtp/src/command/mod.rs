//! Client command lines.
//!
//! Every command the engine sends is a single CRLF-terminated line;
//! [`Command::serialize`] renders exactly the bytes that go on the wire.

use crate::types::{Address, AuthMechanism};

/// Fixed sender substituted when a message has no sender address or is
/// sent with the sender withheld. Never empty: an empty `MAIL FROM`
/// would be a silent protocol violation.
pub const PLACEHOLDER_SENDER: &str = "root@localhost.com";

/// One protocol command, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain greeting for servers that reject EHLO
    Helo {
        /// Name the client introduces itself with
        hostname: String,
    },
    /// Extended greeting that solicits the capability list
    Ehlo {
        /// Name the client introduces itself with
        hostname: String,
    },
    /// Asks the server to begin a TLS handshake
    StartTls,
    /// Opens a SASL exchange
    Auth {
        /// Mechanism to request
        mechanism: AuthMechanism,
    },
    /// Bare base64 line answering a 334 continuation
    AuthResponse {
        /// Base64-encoded SASL payload
        payload: String,
    },
    /// Opens a mail transaction
    MailFrom {
        /// Sender address; `None` falls back to [`PLACEHOLDER_SENDER`]
        from: Option<Address>,
    },
    /// Adds one recipient to the transaction
    RcptTo {
        /// Recipient mailbox
        to: Address,
    },
    /// Announces the message content
    Data,
    /// Aborts the current transaction
    Rset,
    /// Ends the session
    Quit,
}

impl Command {
    /// Renders the command as one wire line, trailing CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth { mechanism } => format!("AUTH {}", mechanism.as_str()),
            Self::AuthResponse { payload } => payload.clone(),
            Self::MailFrom { from } => {
                let sender = from.as_ref().map_or(PLACEHOLDER_SENDER, Address::as_str);
                format!("MAIL FROM:<{sender}>")
            }
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        line.push_str("\r\n");
        line.into_bytes()
    }
}
