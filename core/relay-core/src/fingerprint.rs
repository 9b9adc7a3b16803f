//! Content fingerprints for change detection.
//!
//! A fingerprint is an MD5 digest of the JSON serialization of a session's
//! ordered message list. It is a cheap "did anything change" signal, not an
//! integrity check. JSON keeps role, content and order, and serde_json writes
//! strings as UTF-8 without lossy escaping, so non-ASCII text hashes by its
//! full byte content.

use std::fmt;

use crate::types::Message;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// The remote sent no message list at all. Matches only another
    /// `Absent`, never a digest, so a list appearing or vanishing is a change.
    Absent,
    Digest(String),
}

impl Fingerprint {
    pub fn of(messages: Option<&[Message]>) -> Self {
        let Some(messages) = messages else {
            return Fingerprint::Absent;
        };
        match serde_json::to_vec(messages) {
            Ok(bytes) => Fingerprint::Digest(format!("{:x}", md5::compute(bytes))),
            // Serializing plain structs of strings cannot fail.
            Err(_) => Fingerprint::Absent,
        }
    }

    /// True when both sides describe the same content: equal digests, or
    /// both absent.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        match (self, other) {
            (Fingerprint::Digest(left), Fingerprint::Digest(right)) => left == right,
            (Fingerprint::Absent, Fingerprint::Absent) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Fingerprint::Absent => None,
            Fingerprint::Digest(digest) => Some(digest),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Absent => write!(f, "-"),
            Fingerprint::Digest(digest) => write!(f, "{}", &digest[..digest.len().min(8)]),
        }
    }
}

/// Whether `candidate` should replace what was last committed.
pub fn is_change(last_committed: Option<&Fingerprint>, candidate: &Fingerprint) -> bool {
    match last_committed {
        None => true,
        Some(last) => !last.matches(candidate),
    }
}
