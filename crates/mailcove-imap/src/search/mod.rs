//! Typed search queries and their compilation to IMAP SEARCH/SORT/THREAD
//! expressions.
//!
//! Callers build a [`SearchQuery`] tree; [`optimize`] normalises it; the
//! emitter turns it into wire bytes with charset negotiation. Variants that
//! need an extension declare it via [`SearchQuery::required_capability`] and
//! fail with [`crate::Error::Unsupported`] when the server lacks it.

mod emit;
mod optimize;
mod sort;

pub use emit::{
    SearchCharset, SearchOptions, SearchReturn, compile_search, compile_sort, compile_thread,
    query_has_non_ascii,
};
pub use optimize::optimize;
pub use sort::{SortCriterion, SortKey, ThreadAlgorithm};

use crate::types::{Capability, CapabilitySet, SequenceSet, UidSet};
use crate::{Error, Result};

/// Which date a date key matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    /// INTERNALDATE before the given date.
    Before,
    /// INTERNALDATE on the given date.
    On,
    /// INTERNALDATE on or after the given date.
    Since,
    /// Date header before the given date.
    SentBefore,
    /// Date header on the given date.
    SentOn,
    /// Date header on or after the given date.
    SentSince,
}

impl DateKind {
    const fn key(self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::On => "ON",
            Self::Since => "SINCE",
            Self::SentBefore => "SENTBEFORE",
            Self::SentOn => "SENTON",
            Self::SentSince => "SENTSINCE",
        }
    }
}

/// Which text field a text key matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// Subject header.
    Subject,
    /// From header.
    From,
    /// To header.
    To,
    /// Cc header.
    Cc,
    /// Bcc header.
    Bcc,
    /// Message body.
    Body,
    /// Headers and body.
    Text,
}

impl TextKind {
    const fn key(self) -> &'static str {
        match self {
            Self::Subject => "SUBJECT",
            Self::From => "FROM",
            Self::To => "TO",
            Self::Cc => "CC",
            Self::Bcc => "BCC",
            Self::Body => "BODY",
            Self::Text => "TEXT",
        }
    }
}

/// Which numeric property a numeric key matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// RFC822.SIZE greater than the value.
    Larger,
    /// RFC822.SIZE smaller than the value.
    Smaller,
}

impl NumericKind {
    const fn key(self) -> &'static str {
        match self {
            Self::Larger => "LARGER",
            Self::Smaller => "SMALLER",
        }
    }
}

/// A typed search query tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// All messages.
    All,
    /// Conjunction (IMAP's implicit AND of space-separated keys).
    And(Vec<SearchQuery>),
    /// Disjunction.
    Or(Box<SearchQuery>, Box<SearchQuery>),
    /// Negation.
    Not(Box<SearchQuery>),
    /// Messages with UIDs in the set.
    Uids(UidSet),
    /// Messages with sequence numbers in the set.
    SeqSet(SequenceSet),
    /// Messages with the `\Answered` flag.
    Answered,
    /// Messages with the `\Deleted` flag.
    Deleted,
    /// Messages with the `\Draft` flag.
    Draft,
    /// Messages with the `\Flagged` flag.
    Flagged,
    /// Messages with `\Recent` but not `\Seen`.
    New,
    /// Messages without `\Recent`.
    Old,
    /// Messages with `\Recent`.
    Recent,
    /// Messages with `\Seen`.
    Seen,
    /// Messages without `\Answered`.
    Unanswered,
    /// Messages without `\Deleted`.
    Undeleted,
    /// Messages without `\Draft`.
    Undraft,
    /// Messages without `\Flagged`.
    Unflagged,
    /// Messages without `\Seen`.
    Unseen,
    /// Messages with the given keyword flag.
    Keyword(String),
    /// Messages without the given keyword flag.
    Unkeyword(String),
    /// Date comparison; the date is in IMAP `d-MMM-yyyy` form.
    Date(DateKind, String),
    /// Text search in the given field.
    Text(TextKind, String),
    /// Numeric comparison.
    Numeric(NumericKind, u32),
    /// Arbitrary header field contains value.
    Header(String, String),
    /// Mod-sequence at least the value (CONDSTORE).
    ModSeq(u64),
    /// Annotation match (RFC 5257): entry, attribute, value.
    Annotation {
        /// Entry name, e.g. `/comment`.
        entry: String,
        /// Attribute, e.g. `value`.
        attribute: String,
        /// Value to match.
        value: String,
    },
    /// Named server-side filter (RFC 5466).
    Filter(String),
    /// Fuzzy matching wrapper (RFC 6203).
    Fuzzy(Box<SearchQuery>),
    /// Received within the last n seconds (RFC 5032).
    Younger(u32),
    /// Received more than n seconds ago (RFC 5032).
    Older(u32),
    /// Save date before the given date (RFC 8514).
    SavedBefore(String),
    /// Save date on the given date (RFC 8514).
    SavedOn(String),
    /// Save date on or after the given date (RFC 8514).
    SavedSince(String),
    /// Messages with a save date (RFC 8514).
    SaveDateSupported,
    /// Gmail message id.
    GmailMessageId(u64),
    /// Gmail thread id.
    GmailThreadId(u64),
    /// Gmail label.
    GmailLabel(String),
    /// Raw Gmail search expression.
    GmailRaw(String),
}

impl SearchQuery {
    /// Convenience: `AND` of two queries.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(vec![self, other])
    }

    /// Convenience: `OR` of two queries.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Convenience: negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Returns the feature name this node requires, if it needs one beyond
    /// base IMAP4rev1.
    #[must_use]
    pub const fn required_capability(&self) -> Option<&'static str> {
        match self {
            Self::ModSeq(_) => Some("CONDSTORE"),
            Self::Annotation { .. } => Some("ANNOTATE"),
            Self::Filter(_) => Some("FILTERS"),
            Self::Fuzzy(_) => Some("SEARCH=FUZZY"),
            Self::Older(_) | Self::Younger(_) => Some("WITHIN"),
            Self::SavedBefore(_)
            | Self::SavedOn(_)
            | Self::SavedSince(_)
            | Self::SaveDateSupported => Some("SAVEDATE"),
            Self::GmailMessageId(_)
            | Self::GmailThreadId(_)
            | Self::GmailLabel(_)
            | Self::GmailRaw(_) => Some("X-GM-EXT-1"),
            _ => None,
        }
    }

    /// Checks every node's capability guard against the advertised set.
    pub fn check_capabilities(&self, caps: &CapabilitySet) -> Result<()> {
        if let Some(feature) = self.required_capability() {
            let supported = match self {
                Self::ModSeq(_) => caps.is_set(&Capability::CondStore),
                Self::Annotation { .. } => caps.is_set(&Capability::Annotate),
                Self::Filter(_) => caps.is_set(&Capability::Filters),
                Self::Fuzzy(_) => caps.is_set(&Capability::SearchFuzzy),
                Self::Older(_) | Self::Younger(_) => caps.is_set(&Capability::Within),
                Self::SavedBefore(_)
                | Self::SavedOn(_)
                | Self::SavedSince(_)
                | Self::SaveDateSupported => caps.is_set(&Capability::SaveDate),
                Self::GmailMessageId(_)
                | Self::GmailThreadId(_)
                | Self::GmailLabel(_)
                | Self::GmailRaw(_) => caps.is_set(&Capability::XGmExt1),
                _ => true,
            };
            if !supported {
                return Err(Error::Unsupported(feature));
            }
        }

        match self {
            Self::And(items) => {
                for item in items {
                    item.check_capabilities(caps)?;
                }
            }
            Self::Or(a, b) => {
                a.check_capabilities(caps)?;
                b.check_capabilities(caps)?;
            }
            Self::Not(inner) | Self::Fuzzy(inner) => inner.check_capabilities(caps)?,
            _ => {}
        }

        Ok(())
    }
}
