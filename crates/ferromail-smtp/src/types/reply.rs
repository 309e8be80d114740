//! Named SMTP reply codes.
//!
//! The session drives every transition off exact codes, phase by
//! phase; the newtype keeps stray integers out of the dispatch and
//! gives the well-known codes names.

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Service ready; the greeting, and the answer to STARTTLS.
    pub const SERVICE_READY: Self = Self(220);
    /// Closing the channel, the answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// Authentication exchange completed.
    pub const AUTH_SUCCESS: Self = Self(235);
    /// Requested action completed.
    pub const OK: Self = Self(250);
    /// Recipient not local; the server will forward.
    pub const FORWARD: Self = Self(251);
    /// Server challenge inside an AUTH exchange.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// Go ahead and send the message content.
    pub const START_DATA: Self = Self(354);
    /// Service shutting down or refusing new work.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// Mailbox busy or temporarily blocked.
    pub const MAILBOX_BUSY: Self = Self(450);
    /// Server-side processing error.
    pub const LOCAL_ERROR: Self = Self(451);
    /// Server out of storage.
    pub const INSUFFICIENT_STORAGE: Self = Self(452);
    /// TLS temporarily unavailable.
    pub const TLS_NOT_AVAILABLE: Self = Self(454);
    /// Command unrecognized.
    pub const SYNTAX_ERROR: Self = Self(500);
    /// Bad syntax in a command argument.
    pub const PARAMETER_ERROR: Self = Self(501);
    /// Command not implemented.
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// Commands issued out of order.
    pub const BAD_SEQUENCE: Self = Self(503);
    /// Command parameter not implemented.
    pub const PARAMETER_NOT_IMPLEMENTED: Self = Self(504);
    /// Credentials rejected.
    pub const AUTH_FAILED: Self = Self(535);
    /// Mailbox unavailable or access denied.
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// User not local.
    pub const USER_NOT_LOCAL: Self = Self(551);
    /// Message exceeds the storage allocation.
    pub const EXCEEDED_STORAGE: Self = Self(552);
    /// Mailbox name not allowed.
    pub const MAILBOX_NAME_INVALID: Self = Self(553);
    /// Transaction failed.
    pub const TRANSACTION_FAILED: Self = Self(554);
    /// Delivery not authorized by policy.
    pub const BLOCKED: Self = Self(571);

    /// Wraps a raw code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_named_codes_carry_their_numbers() {
        assert_eq!(ReplyCode::SERVICE_READY.as_u16(), 220);
        assert_eq!(ReplyCode::AUTH_CONTINUE.as_u16(), 334);
        assert_eq!(ReplyCode::START_DATA.as_u16(), 354);
        assert_eq!(ReplyCode::SERVICE_UNAVAILABLE.as_u16(), 421);
        assert_eq!(ReplyCode::AUTH_FAILED.as_u16(), 535);
    }

    #[test]
    fn test_raw_code_round_trip() {
        assert_eq!(ReplyCode::new(421), ReplyCode::SERVICE_UNAVAILABLE);
        assert_eq!(ReplyCode::new(421).as_u16(), 421);
    }

    #[test]
    fn test_display_prints_bare_number() {
        assert_eq!(ReplyCode::OK.to_string(), "250");
        assert_eq!(ReplyCode::AUTH_FAILED.to_string(), "535");
    }

    #[test]
    fn test_codes_order_numerically() {
        assert!(ReplyCode::OK < ReplyCode::MAILBOX_BUSY);
        assert!(ReplyCode::MAILBOX_BUSY < ReplyCode::AUTH_FAILED);
    }
}
