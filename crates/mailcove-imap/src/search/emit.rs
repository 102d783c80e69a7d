//! Search query emission with charset negotiation.
//!
//! Text arguments follow a charset ladder: pure ASCII inlines as
//! atom/quoted/literal; otherwise the first attempt declares `CHARSET UTF-8`
//! and sends the text as literals; a `BADCHARSET` rejection triggers exactly
//! one retry that drops the declaration and forces the bytes through as
//! literals. Sessions with UTF8=ACCEPT skip the ladder entirely since 8-bit
//! is quoted-safe there.

use crate::command::{BuiltCommand, CommandAccumulator, EncodeOptions, Literal};
use crate::{Error, Result};

use super::sort::{SortKey, ThreadAlgorithm};
use super::{SearchQuery, optimize};

/// Charset stage for one emission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCharset {
    /// No charset clause; text is ASCII or quoted-safe UTF-8.
    Plain,
    /// Declare `CHARSET UTF-8` and send non-ASCII text as literals.
    Utf8,
    /// After BADCHARSET: no declaration, non-ASCII bytes forced into
    /// literals.
    Fallback,
}

impl SearchCharset {
    /// Picks the first rung of the ladder for a query.
    #[must_use]
    pub fn initial(query: &SearchQuery, opts: EncodeOptions) -> Self {
        if opts.utf8_accept || !query_has_non_ascii(query) {
            Self::Plain
        } else {
            Self::Utf8
        }
    }

    /// The next rung after a BADCHARSET rejection, if one remains.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Utf8 => Some(Self::Fallback),
            Self::Plain | Self::Fallback => None,
        }
    }

    /// The charset atom SORT/THREAD always carry.
    #[must_use]
    const fn atom(self, opts: EncodeOptions) -> &'static str {
        if matches!(self, Self::Utf8) || opts.utf8_accept {
            "UTF-8"
        } else {
            "US-ASCII"
        }
    }
}

/// ESEARCH result options (RFC 4731 / RFC 6203).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchReturn {
    /// Lowest matching identifier.
    Min,
    /// Highest matching identifier.
    Max,
    /// All matching identifiers.
    All,
    /// Match count.
    Count,
    /// Relevancy scores (FUZZY).
    Relevancy,
}

impl SearchReturn {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::All => "ALL",
            Self::Count => "COUNT",
            Self::Relevancy => "RELEVANCY",
        }
    }
}

/// How a search command is issued.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Use `UID SEARCH` and interpret results as UIDs.
    pub uid: bool,
    /// `RETURN (...)` options; `None` issues a plain SEARCH.
    pub ret: Option<Vec<SearchReturn>>,
}

/// True if any text argument of the query contains non-ASCII.
#[must_use]
pub fn query_has_non_ascii(query: &SearchQuery) -> bool {
    match query {
        SearchQuery::Text(_, s)
        | SearchQuery::GmailLabel(s)
        | SearchQuery::GmailRaw(s)
        | SearchQuery::Filter(s) => !s.is_ascii(),
        SearchQuery::Header(name, value) => !name.is_ascii() || !value.is_ascii(),
        SearchQuery::Annotation { entry, attribute, value } => {
            !entry.is_ascii() || !attribute.is_ascii() || !value.is_ascii()
        }
        SearchQuery::And(items) => items.iter().any(query_has_non_ascii),
        SearchQuery::Or(a, b) => query_has_non_ascii(a) || query_has_non_ascii(b),
        SearchQuery::Not(inner) | SearchQuery::Fuzzy(inner) => query_has_non_ascii(inner),
        _ => false,
    }
}

/// Compiles a SEARCH command.
pub fn compile_search(
    query: &SearchQuery,
    options: &SearchOptions,
    opts: EncodeOptions,
    charset: SearchCharset,
) -> Result<BuiltCommand> {
    let query = optimize(query.clone());
    let mut acc = CommandAccumulator::new(opts);

    if options.uid {
        acc.raw(b"UID ");
    }
    acc.raw(b"SEARCH ");

    if let Some(ret) = &options.ret {
        acc.raw(b"RETURN (");
        for (i, item) in ret.iter().enumerate() {
            if i > 0 {
                acc.raw(b" ");
            }
            acc.atom(item.as_str());
        }
        acc.raw(b") ");
    }

    if charset == SearchCharset::Utf8 {
        acc.raw(b"CHARSET UTF-8 ");
    }

    emit_query(&mut acc, &query, charset)?;
    Ok(acc.finish())
}

/// Compiles a SORT command: `SORT (keys) <charset> <query>`.
pub fn compile_sort(
    keys: &[SortKey],
    query: &SearchQuery,
    uid: bool,
    opts: EncodeOptions,
    charset: SearchCharset,
) -> Result<BuiltCommand> {
    if keys.is_empty() {
        return Err(Error::Protocol("SORT requires at least one key".to_string()));
    }

    let query = optimize(query.clone());
    let mut acc = CommandAccumulator::new(opts);

    if uid {
        acc.raw(b"UID ");
    }
    acc.raw(b"SORT (");
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            acc.raw(b" ");
        }
        acc.atom(&key.to_string());
    }
    acc.raw(b") ");
    acc.atom(charset.atom(opts));
    acc.raw(b" ");

    emit_query(&mut acc, &query, charset)?;
    Ok(acc.finish())
}

/// Compiles a THREAD command: `THREAD <alg> <charset> <query>`.
pub fn compile_thread(
    algorithm: ThreadAlgorithm,
    query: &SearchQuery,
    uid: bool,
    opts: EncodeOptions,
    charset: SearchCharset,
) -> Result<BuiltCommand> {
    let query = optimize(query.clone());
    let mut acc = CommandAccumulator::new(opts);

    if uid {
        acc.raw(b"UID ");
    }
    acc.raw(b"THREAD ");
    acc.atom(algorithm.as_str());
    acc.raw(b" ");
    acc.atom(charset.atom(opts));
    acc.raw(b" ");

    emit_query(&mut acc, &query, charset)?;
    Ok(acc.finish())
}

/// Emits one query node.
#[allow(clippy::too_many_lines)]
fn emit_query(
    acc: &mut CommandAccumulator,
    query: &SearchQuery,
    charset: SearchCharset,
) -> Result<()> {
    match query {
        SearchQuery::All => acc.raw(b"ALL"),
        SearchQuery::And(items) => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    acc.raw(b" ");
                }
                emit_query(acc, item, charset)?;
            }
        }
        SearchQuery::Or(a, b) => {
            acc.raw(b"OR ");
            emit_query(acc, a, charset)?;
            acc.raw(b" ");
            emit_query(acc, b, charset)?;
        }
        SearchQuery::Not(inner) => {
            acc.raw(b"NOT ");
            emit_query(acc, inner, charset)?;
        }
        SearchQuery::Uids(uids) => {
            acc.raw(b"UID ");
            acc.atom(&uids.to_string());
        }
        SearchQuery::SeqSet(set) => acc.atom(&set.to_string()),
        SearchQuery::Answered => acc.raw(b"ANSWERED"),
        SearchQuery::Deleted => acc.raw(b"DELETED"),
        SearchQuery::Draft => acc.raw(b"DRAFT"),
        SearchQuery::Flagged => acc.raw(b"FLAGGED"),
        SearchQuery::New => acc.raw(b"NEW"),
        SearchQuery::Old => acc.raw(b"OLD"),
        SearchQuery::Recent => acc.raw(b"RECENT"),
        SearchQuery::Seen => acc.raw(b"SEEN"),
        SearchQuery::Unanswered => acc.raw(b"UNANSWERED"),
        SearchQuery::Undeleted => acc.raw(b"UNDELETED"),
        SearchQuery::Undraft => acc.raw(b"UNDRAFT"),
        SearchQuery::Unflagged => acc.raw(b"UNFLAGGED"),
        SearchQuery::Unseen => acc.raw(b"UNSEEN"),
        SearchQuery::Keyword(flag) => {
            acc.raw(b"KEYWORD ");
            acc.atom(flag);
        }
        SearchQuery::Unkeyword(flag) => {
            acc.raw(b"UNKEYWORD ");
            acc.atom(flag);
        }
        SearchQuery::Date(kind, date) => {
            acc.atom(kind.key());
            acc.raw(b" ");
            acc.atom(date);
        }
        SearchQuery::Text(kind, text) => {
            acc.atom(kind.key());
            acc.raw(b" ");
            emit_text(acc, text, charset);
        }
        SearchQuery::Numeric(kind, n) => {
            acc.atom(kind.key());
            acc.raw(b" ");
            acc.uint(u64::from(*n));
        }
        SearchQuery::Header(name, value) => {
            acc.raw(b"HEADER ");
            emit_text(acc, name, charset);
            acc.raw(b" ");
            emit_text(acc, value, charset);
        }
        SearchQuery::ModSeq(n) => {
            acc.raw(b"MODSEQ ");
            acc.uint(*n);
        }
        SearchQuery::Annotation {
            entry,
            attribute,
            value,
        } => {
            acc.raw(b"ANNOTATION ");
            acc.atom(entry);
            acc.raw(b" ");
            acc.atom(attribute);
            acc.raw(b" ");
            emit_text(acc, value, charset);
        }
        SearchQuery::Filter(name) => {
            acc.raw(b"FILTER ");
            acc.atom(name);
        }
        SearchQuery::Fuzzy(inner) => {
            acc.raw(b"FUZZY ");
            emit_query(acc, inner, charset)?;
        }
        SearchQuery::Younger(seconds) => {
            acc.raw(b"YOUNGER ");
            acc.uint(u64::from(*seconds));
        }
        SearchQuery::Older(seconds) => {
            acc.raw(b"OLDER ");
            acc.uint(u64::from(*seconds));
        }
        SearchQuery::SavedBefore(date) => {
            acc.raw(b"SAVEDBEFORE ");
            acc.atom(date);
        }
        SearchQuery::SavedOn(date) => {
            acc.raw(b"SAVEDON ");
            acc.atom(date);
        }
        SearchQuery::SavedSince(date) => {
            acc.raw(b"SAVEDSINCE ");
            acc.atom(date);
        }
        SearchQuery::SaveDateSupported => acc.raw(b"SAVEDATESUPPORTED"),
        SearchQuery::GmailMessageId(id) => {
            acc.raw(b"X-GM-MSGID ");
            acc.uint(*id);
        }
        SearchQuery::GmailThreadId(id) => {
            acc.raw(b"X-GM-THRID ");
            acc.uint(*id);
        }
        SearchQuery::GmailLabel(label) => {
            acc.raw(b"X-GM-LABELS ");
            emit_text(acc, label, charset);
        }
        SearchQuery::GmailRaw(expr) => {
            // Gmail parses the raw expression itself; always quote it
            acc.raw(b"X-GM-RAW ");
            if acc.options().utf8_accept || expr.is_ascii() {
                acc.quoted(expr);
            } else {
                acc.literal(Literal::from(expr.clone()), false);
            }
        }
    }
    Ok(())
}

/// Emits one text argument through the charset ladder.
fn emit_text(acc: &mut CommandAccumulator, text: &str, _charset: SearchCharset) {
    if acc.options().utf8_accept || text.is_ascii() {
        acc.string(Some(text));
    } else {
        // Both the UTF-8 attempt and the fallback send the bytes as a
        // literal; only the CHARSET clause differs.
        acc.literal(Literal::from(text.to_string()), false);
    }
}
