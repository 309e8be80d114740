//! Authentication policy and mechanism selection.

use crate::types::{AuthMechanism, ServerCaps};

pub mod sasl;

/// How the session authenticates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Send unauthenticated.
    None,
    /// Pick from what the server advertises, strongest first.
    #[default]
    Auto,
    /// Use exactly this mechanism.
    Fixed(AuthMechanism),
}

/// Local preference order for auto negotiation, strongest first.
const PREFERENCE: [AuthMechanism; 3] = [
    AuthMechanism::CramMd5,
    AuthMechanism::Login,
    AuthMechanism::Plain,
];

/// Mechanisms already attempted in this session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriedSet(u8);

impl TriedSet {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Records an attempt.
    pub const fn insert(&mut self, mechanism: AuthMechanism) {
        self.0 |= Self::bit(mechanism);
    }

    /// Returns true if the mechanism was already attempted.
    #[must_use]
    pub const fn contains(self, mechanism: AuthMechanism) -> bool {
        self.0 & Self::bit(mechanism) != 0
    }

    const fn bit(mechanism: AuthMechanism) -> u8 {
        match mechanism {
            AuthMechanism::CramMd5 => 1 << 0,
            AuthMechanism::Login => 1 << 1,
            AuthMechanism::Plain => 1 << 2,
        }
    }
}

/// Picks the next mechanism to attempt, or `None` once the ladder is
/// exhausted.
///
/// A fixed policy yields its mechanism once. With `prefer_login_for_plain`
/// set, a fixed PLAIN policy tries LOGIN before PLAIN — some servers
/// advertise PLAIN they cannot complete, and the fallback is configured,
/// not sniffed from the wire. Auto policy walks the local preference
/// order restricted to the server-advertised set: no AUTH capability at
/// all means no mechanism, while AUTH advertised without naming any
/// mechanism gets the full local order.
///
/// The caller records every returned mechanism in `tried`, so repeated
/// calls terminate after at most the size of the local set.
#[must_use]
pub fn next_mechanism(
    policy: AuthPolicy,
    caps: ServerCaps,
    tried: TriedSet,
    prefer_login_for_plain: bool,
) -> Option<AuthMechanism> {
    match policy {
        AuthPolicy::None => None,
        AuthPolicy::Fixed(mechanism) => {
            if prefer_login_for_plain
                && mechanism == AuthMechanism::Plain
                && !tried.contains(AuthMechanism::Login)
            {
                return Some(AuthMechanism::Login);
            }
            (!tried.contains(mechanism)).then_some(mechanism)
        }
        AuthPolicy::Auto => {
            if !caps.has_auth() {
                return None;
            }
            let unrestricted = !caps.advertises_any_mechanism();
            PREFERENCE
                .iter()
                .copied()
                .find(|&m| !tried.contains(m) && (unrestricted || caps.advertises(m)))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn caps(text: &str) -> ServerCaps {
        ServerCaps::from_reply_text(text)
    }

    #[test]
    fn test_policy_none_never_authenticates() {
        let all = caps("250-hi\r\n250 AUTH PLAIN LOGIN CRAM-MD5\r\n");
        assert_eq!(
            next_mechanism(AuthPolicy::None, all, TriedSet::new(), false),
            None
        );
    }

    #[test]
    fn test_fixed_returns_once() {
        let policy = AuthPolicy::Fixed(AuthMechanism::CramMd5);
        let mut tried = TriedSet::new();

        let first = next_mechanism(policy, ServerCaps::empty(), tried, false);
        assert_eq!(first, Some(AuthMechanism::CramMd5));
        tried.insert(AuthMechanism::CramMd5);

        assert_eq!(next_mechanism(policy, ServerCaps::empty(), tried, false), None);
    }

    #[test]
    fn test_fixed_plain_prefers_login_when_flagged() {
        let policy = AuthPolicy::Fixed(AuthMechanism::Plain);
        let mut tried = TriedSet::new();

        assert_eq!(
            next_mechanism(policy, ServerCaps::empty(), tried, true),
            Some(AuthMechanism::Login)
        );
        tried.insert(AuthMechanism::Login);

        assert_eq!(
            next_mechanism(policy, ServerCaps::empty(), tried, true),
            Some(AuthMechanism::Plain)
        );
        tried.insert(AuthMechanism::Plain);

        assert_eq!(next_mechanism(policy, ServerCaps::empty(), tried, true), None);
    }

    #[test]
    fn test_fixed_plain_without_flag_stays_plain() {
        let policy = AuthPolicy::Fixed(AuthMechanism::Plain);
        assert_eq!(
            next_mechanism(policy, ServerCaps::empty(), TriedSet::new(), false),
            Some(AuthMechanism::Plain)
        );
    }

    #[test]
    fn test_auto_picks_strongest_advertised() {
        let advertised = caps("250-hi\r\n250 AUTH PLAIN LOGIN CRAM-MD5\r\n");
        assert_eq!(
            next_mechanism(AuthPolicy::Auto, advertised, TriedSet::new(), false),
            Some(AuthMechanism::CramMd5)
        );
    }

    #[test]
    fn test_auto_respects_advertised_set() {
        let advertised = caps("250-hi\r\n250 AUTH PLAIN\r\n");
        assert_eq!(
            next_mechanism(AuthPolicy::Auto, advertised, TriedSet::new(), false),
            Some(AuthMechanism::Plain)
        );
    }

    #[test]
    fn test_auto_skips_tried() {
        let advertised = caps("250-hi\r\n250 AUTH PLAIN CRAM-MD5\r\n");
        let mut tried = TriedSet::new();
        tried.insert(AuthMechanism::CramMd5);
        assert_eq!(
            next_mechanism(AuthPolicy::Auto, advertised, tried, false),
            Some(AuthMechanism::Plain)
        );
    }

    #[test]
    fn test_auto_without_auth_capability_skips_authentication() {
        let plain_server = caps("250-hi\r\n250 SIZE 10240000\r\n");
        assert_eq!(
            next_mechanism(AuthPolicy::Auto, plain_server, TriedSet::new(), false),
            None
        );
    }

    #[test]
    fn test_auto_without_advertised_mechanisms_tries_all() {
        // AUTH advertised with no mechanism list: walk the full local order.
        let bare = caps("250-hi\r\n250 AUTH\r\n");
        let mut tried = TriedSet::new();
        let mut order = Vec::new();
        while let Some(m) = next_mechanism(AuthPolicy::Auto, bare, tried, false) {
            order.push(m);
            tried.insert(m);
        }
        assert_eq!(
            order,
            vec![
                AuthMechanism::CramMd5,
                AuthMechanism::Login,
                AuthMechanism::Plain,
            ]
        );
    }

    #[test]
    fn test_ladder_terminates_for_every_policy() {
        let advertised = caps("250-hi\r\n250 AUTH PLAIN LOGIN CRAM-MD5\r\n");
        for policy in [
            AuthPolicy::None,
            AuthPolicy::Auto,
            AuthPolicy::Fixed(AuthMechanism::Plain),
            AuthPolicy::Fixed(AuthMechanism::Login),
            AuthPolicy::Fixed(AuthMechanism::CramMd5),
        ] {
            let mut tried = TriedSet::new();
            let mut seen = Vec::new();
            let mut calls = 0;
            while let Some(m) = next_mechanism(policy, advertised, tried, true) {
                assert!(!seen.contains(&m), "{policy:?} repeated {m}");
                seen.push(m);
                tried.insert(m);
                calls += 1;
                assert!(calls <= 3, "{policy:?} did not terminate");
            }
        }
    }

    #[test]
    fn test_tried_set_tracks_membership() {
        let mut tried = TriedSet::new();
        assert!(!tried.contains(AuthMechanism::Login));
        tried.insert(AuthMechanism::Login);
        assert!(tried.contains(AuthMechanism::Login));
        assert!(!tried.contains(AuthMechanism::Plain));
    }
}
