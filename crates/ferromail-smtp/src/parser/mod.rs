//! Incremental SMTP reply parser.
//!
//! Replies arrive over the wire in arbitrary fragments; the session
//! accumulates bytes and asks this parser whether a complete reply is
//! buffered yet. Nothing is consumed here — the caller drains the
//! returned prefix itself.

use crate::types::ReplyCode;

/// Outcome of scanning the reply accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    /// A complete reply is buffered.
    Reply {
        /// Status code of the reply's final line.
        code: ReplyCode,
        /// Bytes spanned by the reply, all continuation lines included.
        consumed: usize,
    },
    /// No complete reply buffered yet; wait for more bytes.
    Incomplete,
}

/// Scans `buffer` for a complete SMTP reply.
///
/// A line whose fourth character is `-` continues the reply on the next
/// line (`250-PIPELINING`); the first line whose fourth character is
/// anything else ends it, and that line's leading three digits are the
/// status code. The returned `consumed` count covers everything through
/// the final line's terminator. Bare LF line endings are tolerated.
///
/// At least four bytes must be buffered before extraction is attempted.
/// Lines that do not start with three ASCII digits stall the parser
/// (treated as "no reply yet") instead of failing — malformed input never
/// crashes the session, it waits until the transport times out upstream.
#[must_use]
pub fn parse(buffer: &[u8]) -> Parsed {
    let mut offset = 0;

    loop {
        let rest = &buffer[offset..];
        if rest.len() < 4 {
            return Parsed::Incomplete;
        }
        if !rest[0].is_ascii_digit() {
            return Parsed::Incomplete;
        }
        let Some(lf) = rest.iter().position(|&b| b == b'\n') else {
            return Parsed::Incomplete;
        };

        if rest[3] == b'-' {
            // Continuation line; the code comes from a later line.
            offset += lf + 1;
            continue;
        }

        if !rest[1].is_ascii_digit() || !rest[2].is_ascii_digit() {
            return Parsed::Incomplete;
        }

        let code = u16::from(rest[0] - b'0') * 100
            + u16::from(rest[1] - b'0') * 10
            + u16::from(rest[2] - b'0');
        return Parsed::Reply {
            code: ReplyCode::new(code),
            consumed: offset + lf + 1,
        };
    }
}
