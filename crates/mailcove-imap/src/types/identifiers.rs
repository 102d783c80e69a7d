//! Core IMAP identifiers.
//!
//! Types for tags, sequence numbers, UIDs, UIDVALIDITY, and mod-sequences.

use std::num::{NonZeroU32, NonZeroU64};

/// IMAP command tag.
///
/// Tags are alphanumeric prefixes that identify commands and their responses.
/// Each command sent by the client has a unique tag, and the server's response
/// includes the same tag to correlate request and response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message sequence number.
///
/// Sequence numbers are assigned to messages in a mailbox starting from 1.
/// They are ephemeral and change when messages are expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a new sequence number.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
///
/// UIDs are persistent identifiers that don't change when messages are
/// expunged. Combined with `UIDVALIDITY`, they uniquely identify a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a new UID.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UIDVALIDITY value for a mailbox.
///
/// If this value changes, all cached UIDs are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a new UIDVALIDITY.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for UidValidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Modification sequence number (MODSEQ, RFC 7162).
///
/// Each message has a MODSEQ value that increases whenever the message's
/// metadata changes. The server also maintains a HIGHESTMODSEQ per mailbox.
/// Mod-sequences are 63-bit unsigned values and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModSeq(NonZeroU64);

impl ModSeq {
    /// Largest value a mod-sequence may take (63-bit unsigned).
    pub const MAX: u64 = (1 << 63) - 1;

    /// Creates a new `ModSeq` from a u64, returning `None` if zero or out of
    /// the 63-bit range.
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Self> {
        if value > Self::MAX {
            return None;
        }
        NonZeroU64::new(value).map(Self)
    }

    /// Returns the raw value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ModSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for ModSeq {
    type Error = &'static str;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        Self::from_u64(value).ok_or("mod-sequence must be a non-zero 63-bit value")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;

    mod tag_tests {
        use super::*;

        #[test]
        fn new_from_string() {
            let tag = Tag::new("A00000001".to_string());
            assert_eq!(tag.as_str(), "A00000001");
        }

        #[test]
        fn display() {
            let tag = Tag::new("B00000042");
            assert_eq!(format!("{tag}"), "B00000042");
        }

        #[test]
        fn equality() {
            assert_eq!(Tag::new("A00000001"), Tag::new("A00000001"));
            assert_ne!(Tag::new("A00000001"), Tag::new("A00000002"));
        }
    }

    mod seq_num_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(SeqNum::new(1).unwrap().get(), 1);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(SeqNum::new(0).is_none());
        }

        #[test]
        fn ordering() {
            assert!(SeqNum::new(1).unwrap() < SeqNum::new(2).unwrap());
        }
    }

    mod uid_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(Uid::new(100).unwrap().get(), 100);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(Uid::new(0).is_none());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", Uid::new(12345).unwrap()), "12345");
        }
    }

    mod uid_validity_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(UidValidity::new(3857529045).unwrap().get(), 3857529045);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(UidValidity::new(0).is_none());
        }
    }

    mod mod_seq_tests {
        use super::*;

        #[test]
        fn zero_is_rejected() {
            assert!(ModSeq::from_u64(0).is_none());
        }

        #[test]
        fn max_is_63_bits() {
            assert!(ModSeq::from_u64(ModSeq::MAX).is_some());
            assert!(ModSeq::from_u64(ModSeq::MAX + 1).is_none());
        }

        #[test]
        fn try_from() {
            assert_eq!(ModSeq::try_from(7).unwrap().get(), 7);
            assert!(ModSeq::try_from(0).is_err());
        }
    }
}
