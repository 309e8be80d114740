//! Error types for SMTP operations.

use std::io;

use crate::types::MessageId;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
///
/// Reply-driven variants are classified from the server's status code; the
/// raw reply text travels along verbatim so operators can see what the
/// server actually said. Numeric codes never escape the session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server is shutting down or refusing service (421, or unreachable).
    #[error("Service unavailable: {server}")]
    ServiceUnavailable {
        /// Raw server reply text, if any.
        server: String,
    },

    /// Reply that makes no sense in the current protocol phase.
    #[error("Protocol error: {server}")]
    Protocol {
        /// Raw server reply text.
        server: String,
    },

    /// Transient server-side failure (451/452); worth retrying later.
    #[error("Temporary server error: {server}")]
    ServerTemporary {
        /// Raw server reply text.
        server: String,
    },

    /// Permanent server-side rejection of the transaction.
    #[error("Server rejected the message: {server}")]
    Server {
        /// Raw server reply text.
        server: String,
    },

    /// Server refused one of the envelope recipients.
    #[error("Recipient rejected: {server}")]
    RecipientRejected {
        /// Raw server reply text.
        server: String,
    },

    /// Credentials rejected or an authentication exchange failed.
    #[error("Authentication failed: {server}")]
    AuthenticationFailed {
        /// Raw server reply text.
        server: String,
    },

    /// TLS is required but the server cannot offer it.
    #[error("TLS unavailable: {server}")]
    TlsUnavailable {
        /// Raw server reply text; empty when the capability was simply
        /// missing from the EHLO response.
        server: String,
    },

    /// Authentication is required but no usable mechanism remains.
    #[error("No usable authentication mechanism")]
    AuthUnavailable,

    /// Connection dropped mid-transaction.
    #[error("Connection dropped by server")]
    ConnectionDropped,

    /// No outgoing server host configured.
    #[error("No outgoing server configured")]
    NoServerConfigured,

    /// The message queue could not reserve space.
    #[error("Message queue allocation failed")]
    QueueAllocation(#[from] std::collections::TryReserveError),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message id not found by the message source.
    #[error("Message {id} not available")]
    MessageUnavailable {
        /// The id the source could not produce.
        id: MessageId,
    },

    /// Message has no envelope recipients to address.
    #[error("Message has no recipients")]
    NoRecipients,
}

impl Error {
    /// Classifies a 421-style refusal, carrying the server text.
    #[must_use]
    pub fn service_unavailable(server: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            server: server.into(),
        }
    }

    /// Classifies an unexpected reply for the current phase.
    #[must_use]
    pub fn protocol(server: impl Into<String>) -> Self {
        Self::Protocol {
            server: server.into(),
        }
    }

    /// Classifies a transient server failure.
    #[must_use]
    pub fn server_temporary(server: impl Into<String>) -> Self {
        Self::ServerTemporary {
            server: server.into(),
        }
    }

    /// Classifies a permanent server rejection.
    #[must_use]
    pub fn server(server: impl Into<String>) -> Self {
        Self::Server {
            server: server.into(),
        }
    }

    /// Classifies a rejected recipient.
    #[must_use]
    pub fn recipient_rejected(server: impl Into<String>) -> Self {
        Self::RecipientRejected {
            server: server.into(),
        }
    }

    /// Classifies a failed authentication exchange.
    #[must_use]
    pub fn authentication_failed(server: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            server: server.into(),
        }
    }

    /// Classifies a missing or failed TLS upgrade.
    #[must_use]
    pub fn tls_unavailable(server: impl Into<String>) -> Self {
        Self::TlsUnavailable {
            server: server.into(),
        }
    }

    /// Returns true if the failure ends the whole session rather than a
    /// single message.
    #[must_use]
    pub const fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::TlsUnavailable { .. }
                | Self::AuthUnavailable
                | Self::ConnectionDropped
                | Self::NoServerConfigured
        )
    }

    /// Returns true if the failure is worth retrying later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. }
                | Self::ServerTemporary { .. }
                | Self::ConnectionDropped
        )
    }
}
