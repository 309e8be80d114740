//! Server capabilities discovered from EHLO/HELO replies.

/// SASL mechanism the engine can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// Keyed-digest challenge/response; never sends the password
    CramMd5,
    /// Two-step username/password exchange
    Login,
    /// Single NUL-joined identity and password line
    Plain,
}

impl AuthMechanism {
    /// Maps an advertised mechanism name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CRAM-MD5" => Some(Self::CramMd5),
            "LOGIN" => Some(Self::Login),
            "PLAIN" => Some(Self::Plain),
            _ => None,
        }
    }

    /// The keyword as it appears in AUTH commands and EHLO lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CramMd5 => "CRAM-MD5",
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const AUTH: u8 = 1 << 0;
const AUTH_CRAM_MD5: u8 = 1 << 1;
const AUTH_LOGIN: u8 = 1 << 2;
const AUTH_PLAIN: u8 = 1 << 3;
const STARTTLS: u8 = 1 << 4;

const fn mechanism_bit(mechanism: AuthMechanism) -> u8 {
    match mechanism {
        AuthMechanism::CramMd5 => AUTH_CRAM_MD5,
        AuthMechanism::Login => AUTH_LOGIN,
        AuthMechanism::Plain => AUTH_PLAIN,
    }
}

/// Capabilities advertised by the server in its EHLO (or HELO) reply.
///
/// Only trusted between a successful EHLO and the next TLS upgrade or
/// disconnect; the session clears it when either happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerCaps(u8);

impl ServerCaps {
    /// Returns an empty capability set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Scans a raw multi-line reply for advertised capabilities.
    ///
    /// The first line is the server greeting and is skipped. Subsequent
    /// lines are matched case-insensitively after their `250-`/`250 `
    /// prefix: `STARTTLS`, and `AUTH` (or the legacy `AUTH=` spelling)
    /// followed by mechanism tokens. `LOGINDISABLED` does not count as
    /// LOGIN support.
    #[must_use]
    pub fn from_reply_text(text: &str) -> Self {
        let mut caps = Self::empty();

        for line in text.lines().skip(1) {
            let line = line.trim_end_matches('\r');
            let Some(keywords) = strip_code_prefix(line) else {
                continue;
            };

            let mut tokens = keywords.split_whitespace();
            let Some(keyword) = tokens.next() else {
                continue;
            };

            if keyword.eq_ignore_ascii_case("STARTTLS") {
                caps.0 |= STARTTLS;
            } else if keyword.eq_ignore_ascii_case("AUTH") {
                caps.0 |= AUTH;
                caps.note_mechanisms(tokens);
            } else if let Some((name, first)) = keyword.split_once('=') {
                // Legacy "AUTH=PLAIN LOGIN" spelling some older servers
                // still use.
                if name.eq_ignore_ascii_case("AUTH") {
                    caps.0 |= AUTH;
                    caps.note_mechanisms(std::iter::once(first).chain(tokens));
                }
            }
        }

        caps
    }

    /// Folds advertised mechanism tokens into the set.
    fn note_mechanisms<'a>(&mut self, tokens: impl Iterator<Item = &'a str>) {
        for token in tokens {
            if let Some(mechanism) = AuthMechanism::parse(token) {
                self.0 |= mechanism_bit(mechanism);
            }
        }
    }

    /// Returns true if the server advertised the AUTH extension.
    #[must_use]
    pub const fn has_auth(self) -> bool {
        self.0 & AUTH != 0
    }

    /// Returns true if the server advertised STARTTLS.
    #[must_use]
    pub const fn has_starttls(self) -> bool {
        self.0 & STARTTLS != 0
    }

    /// Returns true if the server advertised the given mechanism.
    #[must_use]
    pub const fn advertises(self, mechanism: AuthMechanism) -> bool {
        self.0 & mechanism_bit(mechanism) != 0
    }

    /// Returns true if at least one mechanism was advertised.
    #[must_use]
    pub const fn advertises_any_mechanism(self) -> bool {
        self.0 & (AUTH_CRAM_MD5 | AUTH_LOGIN | AUTH_PLAIN) != 0
    }
}

/// Strips the `250-` / `250 ` prefix from a reply line, returning the
/// keyword portion, or `None` for lines too short to carry one.
fn strip_code_prefix(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return None;
    }
    if bytes[..3].iter().all(u8::is_ascii_digit) && (bytes[3] == b'-' || bytes[3] == b' ') {
        return Some(&line[4..]);
    }
    None
}
