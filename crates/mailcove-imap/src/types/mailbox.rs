//! Mailbox names and per-mailbox state.
//!
//! Mailbox names with non-ASCII characters are encoded with modified UTF-7
//! (RFC 3501 section 5.1.3) unless the session has enabled UTF8=ACCEPT, in
//! which case raw UTF-8 is sent as a literal.

use base64::Engine as _;
use base64::alphabet::Alphabet;
use base64::engine::general_purpose::NO_PAD;
use base64::engine::GeneralPurpose;

use super::{Flags, ModSeq, SeqNum, Uid, UidValidity};

/// Mailbox name, stored in its decoded (Unicode) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Creates a new mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The INBOX mailbox (case-insensitive per RFC).
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Returns the mailbox name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the INBOX.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0.eq_ignore_ascii_case("INBOX")
    }

    /// Returns the wire form of this name with modified UTF-7 encoding.
    #[must_use]
    pub fn encode_utf7(&self) -> String {
        encode_modified_utf7(&self.0)
    }

    /// Decodes a wire-form mailbox name that may use modified UTF-7.
    ///
    /// Returns `None` on malformed encoding.
    #[must_use]
    pub fn decode_utf7(wire: &str) -> Option<Self> {
        decode_modified_utf7(wire).map(Self)
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Modified base64 alphabet: standard with `,` instead of `/`.
const MUTF7_ALPHABET: Alphabet = {
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+,") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("modified UTF-7 alphabet must be valid"),
    }
};

const MUTF7_ENGINE: GeneralPurpose = GeneralPurpose::new(&MUTF7_ALPHABET, NO_PAD);

/// Encodes a Unicode mailbox name into modified UTF-7.
fn encode_modified_utf7(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending: Vec<u16> = Vec::new();

    let flush = |out: &mut String, pending: &mut Vec<u16>| {
        if pending.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(pending.len() * 2);
        for unit in pending.drain(..) {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        out.push('&');
        out.push_str(&MUTF7_ENGINE.encode(&bytes));
        out.push('-');
    };

    for ch in name.chars() {
        if (' '..='~').contains(&ch) {
            flush(&mut out, &mut pending);
            if ch == '&' {
                out.push_str("&-");
            } else {
                out.push(ch);
            }
        } else {
            let mut buf = [0u16; 2];
            pending.extend_from_slice(ch.encode_utf16(&mut buf));
        }
    }
    flush(&mut out, &mut pending);
    out
}

/// Decodes a modified UTF-7 mailbox name back into Unicode.
fn decode_modified_utf7(wire: &str) -> Option<String> {
    let mut out = String::with_capacity(wire.len());
    let mut chars = wire.chars();

    while let Some(ch) = chars.next() {
        if ch != '&' {
            out.push(ch);
            continue;
        }
        let mut encoded = String::new();
        loop {
            match chars.next() {
                Some('-') => break,
                Some(c) => encoded.push(c),
                // Unterminated shift sequence
                None => return None,
            }
        }
        if encoded.is_empty() {
            out.push('&');
            continue;
        }
        let bytes = MUTF7_ENGINE.decode(encoded.as_bytes()).ok()?;
        if bytes.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        out.push_str(&String::from_utf16(&units).ok()?);
    }
    Some(out)
}

/// Mailbox status information from SELECT/EXAMINE and later untagged updates.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// First unseen message sequence number.
    pub unseen: Option<SeqNum>,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Flags defined for this mailbox.
    pub flags: Flags,
    /// Flags that can be permanently stored.
    pub permanent_flags: Flags,
    /// Whether mailbox is read-only.
    pub read_only: bool,
    /// Highest mod-sequence (when CONDSTORE is in play).
    pub highest_mod_seq: Option<ModSeq>,
    /// Server declared it keeps no mod-sequences for this mailbox.
    pub no_mod_seq: bool,
}

/// LIST/LSUB response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Mailbox name (decoded).
    pub mailbox: Mailbox,
}

/// Mailbox attributes from LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// No child mailboxes may exist below this one.
    NoInferiors,
    /// Mailbox has no children.
    HasNoChildren,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox is marked for attention.
    Marked,
    /// Mailbox is not marked.
    Unmarked,
    /// Mailbox is subscribed (LIST-EXTENDED).
    Subscribed,
    // SPECIAL-USE mailbox attributes (RFC 6154)
    /// All messages (virtual mailbox).
    All,
    /// Mailbox is the archive folder.
    Archive,
    /// Mailbox is the drafts folder.
    Drafts,
    /// Flagged/starred messages (virtual mailbox).
    Flagged,
    /// Mailbox is the junk/spam folder.
    Junk,
    /// Mailbox is the sent folder.
    Sent,
    /// Mailbox is the trash folder.
    Trash,
    /// Unknown attribute.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute atom.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\SUBSCRIBED" => Self::Subscribed,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod mailbox_tests {
        use super::*;

        #[test]
        fn inbox_is_case_insensitive() {
            assert!(Mailbox::new("inbox").is_inbox());
            assert!(Mailbox::new("INBOX").is_inbox());
            assert!(!Mailbox::new("INBOX/Sub").is_inbox());
        }

        #[test]
        fn ascii_passes_through() {
            assert_eq!(Mailbox::new("Sent Items").encode_utf7(), "Sent Items");
        }

        #[test]
        fn ampersand_escapes() {
            assert_eq!(Mailbox::new("A&B").encode_utf7(), "A&-B");
            assert_eq!(Mailbox::decode_utf7("A&-B").unwrap().as_str(), "A&B");
        }

        #[test]
        fn non_ascii_round_trips() {
            // The RFC 3501 example
            let name = "~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}";
            let encoded = Mailbox::new(name).encode_utf7();
            assert_eq!(encoded, "~peter/mail/&U,BTFw-/&ZeVnLIqe-");
            assert_eq!(Mailbox::decode_utf7(&encoded).unwrap().as_str(), name);
        }

        #[test]
        fn umlaut_encodes() {
            assert_eq!(Mailbox::new("Entw\u{fc}rfe").encode_utf7(), "Entw&APw-rfe");
        }

        #[test]
        fn decode_rejects_unterminated_shift() {
            assert!(Mailbox::decode_utf7("Entw&APw").is_none());
        }

        #[test]
        fn decode_rejects_bad_base64() {
            assert!(Mailbox::decode_utf7("&!!!-").is_none());
        }
    }

    mod attribute_tests {
        use super::*;

        #[test]
        fn parse_common_attributes() {
            assert_eq!(
                MailboxAttribute::parse("\\HasChildren"),
                MailboxAttribute::HasChildren
            );
            assert_eq!(
                MailboxAttribute::parse("\\noselect"),
                MailboxAttribute::NoSelect
            );
            assert_eq!(MailboxAttribute::parse("\\Trash"), MailboxAttribute::Trash);
        }

        #[test]
        fn parse_unknown_attribute() {
            assert_eq!(
                MailboxAttribute::parse("\\XSpecial"),
                MailboxAttribute::Unknown("\\XSpecial".to_string())
            );
        }
    }
}
