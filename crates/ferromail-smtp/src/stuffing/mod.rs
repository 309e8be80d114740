//! Dot-stuffing for DATA content (RFC 5321 section 4.5.2).
//!
//! A line in the message body that starts with `.` would otherwise be
//! taken by the server as the end-of-data mark, so every `.` that follows
//! a CRLF is doubled on the wire. The body is streamed in transport-sized
//! chunks, and a `CRLF .` sequence can straddle a chunk boundary in two
//! ways (`CR LF | .` and `CR | LF .`); a two-byte [`Carry`] of the last
//! transmitted bytes lets the next chunk detect both without re-scanning
//! the previous one.

/// End-of-data sequence sent exactly once after the final body chunk.
pub const TERMINATOR: &[u8] = b"\r\n.\r\n";

/// The last two bytes transmitted in the previous chunk.
///
/// Starts out empty (no preceding bytes); must be reset whenever a new
/// message begins streaming so state cannot bleed between queued
/// messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Carry([u8; 2]);

impl Carry {
    /// Carry for the start of a fresh message body.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; 2])
    }
}

/// Encodes one body chunk, doubling any `.` that begins a line.
///
/// Returns the bytes to transmit and the carry to feed into the next
/// call. Chunk boundaries are transparent: encoding a body in any number
/// of pieces produces exactly the same wire bytes as encoding it whole.
#[must_use]
pub fn stuff_chunk(chunk: &[u8], carry: Carry) -> (Vec<u8>, Carry) {
    let mut out = Vec::with_capacity(chunk.len() + 8);
    let [mut prev2, mut prev1] = carry.0;

    for &byte in chunk {
        if byte == b'.' && prev2 == b'\r' && prev1 == b'\n' {
            out.push(b'.');
        }
        out.push(byte);
        prev2 = prev1;
        prev1 = byte;
    }

    let next = match out.len() {
        0 => carry,
        1 => Carry([carry.0[1], out[0]]),
        n => Carry([out[n - 2], out[n - 1]]),
    };
    (out, next)
}
