//! Typed FETCH items, STORE actions, and STATUS attributes.

use crate::types::{Flag, ModSeq};

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
    /// Highest mod-sequence (CONDSTORE).
    HighestModSeq,
}

impl StatusAttribute {
    /// Returns the wire atom.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// FLAGS INTERNALDATE RFC822.SIZE ENVELOPE.
    All,
    /// ALL plus BODY.
    Full,
    /// FLAGS INTERNALDATE RFC822.SIZE.
    Fast,
    /// Custom list of items.
    Items(Vec<FetchAttribute>),
}

impl std::fmt::Display for FetchItems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Full => f.write_str("FULL"),
            Self::Fast => f.write_str("FAST"),
            Self::Items(attrs) => {
                if let [single] = attrs.as_slice() {
                    return write!(f, "{single}");
                }
                f.write_str("(")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{attr}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Body structure.
    BodyStructure,
    /// UID.
    Uid,
    /// MODSEQ (CONDSTORE).
    ModSeq,
    /// EMAILID (OBJECTID).
    EmailId,
    /// THREADID (OBJECTID).
    ThreadId,
    /// SAVEDATE.
    SaveDate,
    /// PREVIEW.
    Preview,
    /// X-GM-MSGID (Gmail).
    GmailMessageId,
    /// X-GM-THRID (Gmail).
    GmailThreadId,
    /// X-GM-LABELS (Gmail).
    GmailLabels,
    /// Body section content.
    Body {
        /// Section specifier, e.g. `HEADER.FIELDS (SUBJECT)`.
        section: Option<String>,
        /// Peek (don't set `\Seen`).
        peek: bool,
        /// Partial fetch range: origin octet and length.
        partial: Option<(u32, u32)>,
    },
}

impl std::fmt::Display for FetchAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flags => f.write_str("FLAGS"),
            Self::InternalDate => f.write_str("INTERNALDATE"),
            Self::Rfc822Size => f.write_str("RFC822.SIZE"),
            Self::Envelope => f.write_str("ENVELOPE"),
            Self::BodyStructure => f.write_str("BODYSTRUCTURE"),
            Self::Uid => f.write_str("UID"),
            Self::ModSeq => f.write_str("MODSEQ"),
            Self::EmailId => f.write_str("EMAILID"),
            Self::ThreadId => f.write_str("THREADID"),
            Self::SaveDate => f.write_str("SAVEDATE"),
            Self::Preview => f.write_str("PREVIEW"),
            Self::GmailMessageId => f.write_str("X-GM-MSGID"),
            Self::GmailThreadId => f.write_str("X-GM-THRID"),
            Self::GmailLabels => f.write_str("X-GM-LABELS"),
            Self::Body {
                section,
                peek,
                partial,
            } => {
                if *peek {
                    f.write_str("BODY.PEEK[")?;
                } else {
                    f.write_str("BODY[")?;
                }
                if let Some(section) = section {
                    f.write_str(section)?;
                }
                f.write_str("]")?;
                if let Some((origin, len)) = partial {
                    write!(f, "<{origin}.{len}>")?;
                }
                Ok(())
            }
        }
    }
}

/// What a STORE does to message flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Replace the flag set.
    Set,
    /// Add flags.
    Add,
    /// Remove flags.
    Remove,
}

/// A STORE action: operation, flags, and modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAction {
    /// What to do with the flags.
    pub op: StoreOp,
    /// The flags to apply.
    pub flags: Vec<Flag>,
    /// Suppress the untagged FETCH echo.
    pub silent: bool,
    /// Apply only to messages unchanged since this mod-sequence (CONDSTORE).
    pub unchanged_since: Option<ModSeq>,
}

impl StoreAction {
    /// Replace the flag set.
    #[must_use]
    pub const fn set(flags: Vec<Flag>) -> Self {
        Self {
            op: StoreOp::Set,
            flags,
            silent: false,
            unchanged_since: None,
        }
    }

    /// Add flags.
    #[must_use]
    pub const fn add(flags: Vec<Flag>) -> Self {
        Self {
            op: StoreOp::Add,
            flags,
            silent: false,
            unchanged_since: None,
        }
    }

    /// Remove flags.
    #[must_use]
    pub const fn remove(flags: Vec<Flag>) -> Self {
        Self {
            op: StoreOp::Remove,
            flags,
            silent: false,
            unchanged_since: None,
        }
    }

    /// Suppress the untagged FETCH echo.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Add an UNCHANGEDSINCE modifier (requires CONDSTORE).
    #[must_use]
    pub const fn unchanged_since(mut self, mod_seq: ModSeq) -> Self {
        self.unchanged_since = Some(mod_seq);
        self
    }
}

impl std::fmt::Display for StoreAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Modifiers precede the flag action (RFC 7162)
        if let Some(mod_seq) = self.unchanged_since {
            write!(f, "(UNCHANGEDSINCE {mod_seq}) ")?;
        }
        let prefix = match self.op {
            StoreOp::Set => "FLAGS",
            StoreOp::Add => "+FLAGS",
            StoreOp::Remove => "-FLAGS",
        };
        f.write_str(prefix)?;
        if self.silent {
            f.write_str(".SILENT")?;
        }
        f.write_str(" (")?;
        for (i, flag) in self.flags.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(flag.as_str())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;

    #[test]
    fn fetch_items_macros() {
        assert_eq!(FetchItems::All.to_string(), "ALL");
        assert_eq!(FetchItems::Fast.to_string(), "FAST");
    }

    #[test]
    fn fetch_items_single_attribute_unparenthesised() {
        let items = FetchItems::Items(vec![FetchAttribute::Flags]);
        assert_eq!(items.to_string(), "FLAGS");
    }

    #[test]
    fn fetch_items_list() {
        let items = FetchItems::Items(vec![
            FetchAttribute::Flags,
            FetchAttribute::Uid,
            FetchAttribute::Rfc822Size,
        ]);
        assert_eq!(items.to_string(), "(FLAGS UID RFC822.SIZE)");
    }

    #[test]
    fn body_section_rendering() {
        let attr = FetchAttribute::Body {
            section: Some("HEADER.FIELDS (SUBJECT)".to_string()),
            peek: true,
            partial: Some((0, 1024)),
        };
        assert_eq!(
            attr.to_string(),
            "BODY.PEEK[HEADER.FIELDS (SUBJECT)]<0.1024>"
        );
    }

    #[test]
    fn store_action_rendering() {
        let action = StoreAction::add(vec![Flag::Seen]).silent();
        assert_eq!(action.to_string(), "+FLAGS.SILENT (\\Seen)");
    }

    #[test]
    fn store_action_unchanged_since_precedes_flags() {
        let action = StoreAction::remove(vec![Flag::Deleted])
            .unchanged_since(ModSeq::from_u64(12121230045).unwrap());
        assert_eq!(
            action.to_string(),
            "(UNCHANGEDSINCE 12121230045) -FLAGS (\\Deleted)"
        );
    }

    #[test]
    fn status_attribute_atoms() {
        assert_eq!(StatusAttribute::Messages.as_str(), "MESSAGES");
        assert_eq!(StatusAttribute::HighestModSeq.as_str(), "HIGHESTMODSEQ");
    }
}
