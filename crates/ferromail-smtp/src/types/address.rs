//! Envelope address validation.

use crate::error::{Error, Result};

/// A mailbox address as it appears in MAIL FROM and RCPT TO.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Parses and validates an address.
    ///
    /// # Errors
    ///
    /// Rejects strings without exactly one `@`, with an empty local
    /// part or domain, or containing whitespace or control characters.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Borrows the raw address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates an envelope address (basic validation; full RFC 5321
    /// syntax is the message builder's concern).
    fn validate(addr: &str) -> Result<()> {
        if addr.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidAddress(
                "address contains whitespace or control characters".into(),
            ));
        }
        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress("address must contain '@'".into()));
        };
        if domain.contains('@') {
            return Err(Error::InvalidAddress(
                "address must have exactly one '@'".into(),
            ));
        }
        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(
                "local part and domain cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_simple_mailbox() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn test_rejects_missing_or_duplicate_at() {
        assert!(Address::new("userexample.com").is_err());
        assert!(Address::new("user@host@example.com").is_err());
    }

    #[test]
    fn test_rejects_empty_sides() {
        assert!(Address::new("").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
    }

    #[test]
    fn test_rejects_whitespace_and_controls() {
        assert!(Address::new("user name@example.com").is_err());
        assert!(Address::new("user@example.com\r\n").is_err());
    }
}
