//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses. A tag is the prefix
//! letter followed by an 8-digit zero-padded counter (`A00000001`). The
//! counter increases monotonically for the whole session; the prefix advances
//! when a session is replayed over a new connection, so stale responses can
//! never match a fresh tag.

use std::sync::atomic::{AtomicU32, Ordering};

/// Tag generator for IMAP commands.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{:08}", self.prefix, n)
    }

    /// Returns how many tags have been generated.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Returns the current prefix.
    #[must_use]
    pub const fn prefix(&self) -> char {
        self.prefix
    }

    /// Advances the prefix (wrapping `Z` → `A`) for a replayed session.
    ///
    /// The counter keeps counting; only the prefix changes.
    pub fn advance_prefix(&mut self) {
        self.prefix = match self.prefix {
            'Z' => 'A',
            'z' => 'a',
            c => (c as u8 + 1) as char,
        };
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

impl Clone for TagGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU32::new(self.counter.load(Ordering::Relaxed)),
            prefix: self.prefix,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_eight_digits_and_monotonic() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next(), "A00000001");
        assert_eq!(generator.next(), "A00000002");
        assert_eq!(generator.next(), "A00000003");
    }

    #[test]
    fn custom_prefix() {
        let generator = TagGenerator::new('T');
        assert_eq!(generator.next(), "T00000001");
    }

    #[test]
    fn advance_prefix_keeps_counter() {
        let mut generator = TagGenerator::default();
        let _ = generator.next();
        generator.advance_prefix();
        assert_eq!(generator.next(), "B00000002");
    }

    #[test]
    fn advance_prefix_wraps() {
        let mut generator = TagGenerator::new('Z');
        generator.advance_prefix();
        assert_eq!(generator.prefix(), 'A');
    }
}
