//! Printf-style command builder.
//!
//! Turns a format template plus typed arguments into the byte segments of an
//! IMAP command, splitting around literals. Slots:
//!
//! | Slot | Argument | Emitted as |
//! |------|----------|------------|
//! | `%d` | [`Arg::Int`] | signed decimal |
//! | `%u` | [`Arg::Uint`] | unsigned decimal |
//! | `%s` | [`Arg::Raw`] | raw ASCII (caller guarantees safety) |
//! | `%F` | [`Arg::Folder`] | encoded mailbox name |
//! | `%S` | [`Arg::String`] | atom / quoted / literal / NIL by content |
//! | `%Q` | [`Arg::Quoted`] | like `%S` but never a bare atom |
//! | `%L` | [`Arg::Literal`] | length-prefixed literal |
//! | `%%` | — | literal `%` |
//!
//! Template bytes ≥ 0x80 pass through as UTF-8.

use crate::parser::lexer::is_atom_char;
use crate::types::Mailbox;
use crate::{Error, Result};

use super::literal::Literal;

/// Largest literal LITERAL- allows to be sent without a continuation round
/// trip (RFC 7888).
pub const LITERAL_MINUS_LIMIT: u64 = 4096;

/// Capabilities that shape command encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// UTF8=ACCEPT has been enabled for the session.
    pub utf8_accept: bool,
    /// Server advertises LITERAL+.
    pub literal_plus: bool,
    /// Server advertises LITERAL-.
    pub literal_minus: bool,
}

impl EncodeOptions {
    /// Returns true if a literal of `len` bytes may skip the continuation
    /// round trip.
    #[must_use]
    pub const fn non_synchronizing(self, len: u64) -> bool {
        self.literal_plus || (self.literal_minus && len <= LITERAL_MINUS_LIMIT)
    }
}

/// How a string argument is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    /// Bare atom.
    Atom,
    /// Quoted string.
    Quoted,
    /// Length-prefixed literal.
    Literal,
    /// NIL.
    Nil,
}

/// Chooses the wire form for a string by content.
///
/// All atom-safe characters make an atom; control characters force a literal,
/// as do 8-bit bytes unless UTF8=ACCEPT makes them quoted-safe; everything
/// else quotes.
#[must_use]
pub fn classify(s: &str, utf8_accept: bool) -> StringKind {
    if s.is_empty() {
        return StringKind::Quoted;
    }
    let mut kind = StringKind::Atom;
    for &b in s.as_bytes() {
        if b < 0x20 || b == 0x7F {
            return StringKind::Literal;
        }
        if b >= 0x80 {
            if utf8_accept {
                kind = StringKind::Quoted;
            } else {
                return StringKind::Literal;
            }
        } else if !is_atom_char(b) {
            kind = StringKind::Quoted;
        }
    }
    kind
}

/// One positional argument for a template slot.
pub enum Arg<'a> {
    /// `%d`
    Int(i64),
    /// `%u`
    Uint(u64),
    /// `%s` — raw ASCII, caller guarantees wire safety.
    Raw(&'a str),
    /// `%F`
    Folder(&'a Mailbox),
    /// `%S` — `None` emits NIL.
    String(Option<&'a str>),
    /// `%Q`
    Quoted(&'a str),
    /// `%L`
    Literal(Literal),
}

impl std::fmt::Debug for Arg<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Uint(n) => write!(f, "Uint({n})"),
            Self::Raw(s) => write!(f, "Raw({s:?})"),
            Self::Folder(m) => write!(f, "Folder({:?})", m.as_str()),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Quoted(s) => write!(f, "Quoted({s:?})"),
            Self::Literal(l) => write!(f, "Literal({l:?})"),
        }
    }
}

/// A pre-encoded byte segment with an optional trailing literal.
#[derive(Debug)]
pub struct CommandPart {
    /// Encoded bytes up to and including any literal prefix line.
    pub bytes: Vec<u8>,
    /// Literal payload to write after `bytes`.
    pub literal: Option<Literal>,
    /// True when the engine must wait for a `+` continuation before writing
    /// the literal.
    pub wait_for_continuation: bool,
}

/// A fully built command: its parts in send order.
#[derive(Debug, Default)]
pub struct BuiltCommand {
    /// Send-order parts; the last part ends with CRLF.
    pub parts: Vec<CommandPart>,
}

impl BuiltCommand {
    /// Flattens the parts into the bytes that would cross the wire, rendering
    /// in-memory literals inline. Test helper for send-order assertions.
    #[must_use]
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(&part.bytes);
            if let Some(Literal::Bytes(data)) = &part.literal {
                out.extend_from_slice(data);
            }
        }
        out
    }
}

/// Incremental command assembly; the template builder and the search emitter
/// both sit on top of this.
pub struct CommandAccumulator {
    opts: EncodeOptions,
    parts: Vec<CommandPart>,
    current: Vec<u8>,
}

impl CommandAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new(opts: EncodeOptions) -> Self {
        Self {
            opts,
            parts: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Returns the encode options in effect.
    #[must_use]
    pub const fn options(&self) -> EncodeOptions {
        self.opts
    }

    /// Appends raw bytes to the current part.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.current.extend_from_slice(bytes);
    }

    /// Appends a raw string.
    pub fn atom(&mut self, s: &str) {
        self.current.extend_from_slice(s.as_bytes());
    }

    /// Appends a signed decimal.
    pub fn int(&mut self, n: i64) {
        self.current.extend_from_slice(n.to_string().as_bytes());
    }

    /// Appends an unsigned decimal.
    pub fn uint(&mut self, n: u64) {
        self.current.extend_from_slice(n.to_string().as_bytes());
    }

    /// Appends a string in the form [`classify`] selects.
    pub fn string(&mut self, s: Option<&str>) {
        let Some(s) = s else {
            self.current.extend_from_slice(b"NIL");
            return;
        };
        match classify(s, self.opts.utf8_accept) {
            StringKind::Atom => self.atom(s),
            StringKind::Quoted | StringKind::Nil => self.quoted_raw(s),
            StringKind::Literal => self.literal(Literal::from(s.to_string()), false),
        }
    }

    /// Appends a string, forcing at least quoting (`%Q`).
    pub fn quoted(&mut self, s: &str) {
        match classify(s, self.opts.utf8_accept) {
            StringKind::Atom | StringKind::Quoted | StringKind::Nil => self.quoted_raw(s),
            StringKind::Literal => self.literal(Literal::from(s.to_string()), false),
        }
    }

    /// Appends a mailbox name, honouring the session's international mode.
    ///
    /// Without UTF8=ACCEPT, non-ASCII names go through modified UTF-7 and are
    /// then emitted as an astring; with it, they are sent as raw UTF-8
    /// literals.
    pub fn folder(&mut self, mailbox: &Mailbox) {
        let name = mailbox.as_str();
        if name.is_ascii() {
            self.string(Some(name));
        } else if self.opts.utf8_accept {
            self.literal(Literal::from(name.to_string()), false);
        } else {
            let encoded = mailbox.encode_utf7();
            self.string(Some(&encoded));
        }
    }

    /// Appends a literal: prefix line, part split, payload.
    ///
    /// `wrap_utf8` wraps the payload in the RFC 6855 `UTF8 (~{n}...)` form
    /// used for international APPEND.
    pub fn literal(&mut self, literal: Literal, wrap_utf8: bool) {
        let len = literal.len();
        let non_sync = self.opts.non_synchronizing(len);

        if wrap_utf8 {
            self.current.extend_from_slice(b"UTF8 (~");
        }
        let marker = if non_sync { "+" } else { "" };
        self.current
            .extend_from_slice(format!("{{{len}{marker}}}\r\n").as_bytes());

        self.parts.push(CommandPart {
            bytes: std::mem::take(&mut self.current),
            literal: Some(literal),
            wait_for_continuation: !non_sync,
        });

        if wrap_utf8 {
            self.current.push(b')');
        }
    }

    /// Terminates the command with CRLF and returns the built parts.
    #[must_use]
    pub fn finish(mut self) -> BuiltCommand {
        self.current.extend_from_slice(b"\r\n");
        self.parts.push(CommandPart {
            bytes: self.current,
            literal: None,
            wait_for_continuation: false,
        });
        BuiltCommand { parts: self.parts }
    }

    /// Appends a quoted string with escaping, regardless of content.
    fn quoted_raw(&mut self, s: &str) {
        self.current.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                self.current.push(b'\\');
            }
            self.current.push(b);
        }
        self.current.push(b'"');
    }
}

/// Builds a command from a template and its positional arguments.
///
/// The argument list must match the slots in order; a mismatch is a
/// programming error surfaced as [`Error::Protocol`].
pub fn build(template: &str, args: Vec<Arg<'_>>, opts: EncodeOptions) -> Result<BuiltCommand> {
    let mut acc = CommandAccumulator::new(opts);
    // International APPEND wraps message literals in UTF8 (~{n})
    let append_like = opts.utf8_accept && is_append_like(template);
    let mut args = args.into_iter();

    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'%' {
            acc.raw(&[b]);
            i += 1;
            continue;
        }

        i += 1;
        let Some(&slot) = bytes.get(i) else {
            return Err(Error::Protocol("Dangling % in command template".to_string()));
        };
        i += 1;

        if slot == b'%' {
            acc.raw(b"%");
            continue;
        }

        let arg = args.next().ok_or_else(|| {
            Error::Protocol(format!("Missing argument for %{}", slot as char))
        })?;

        match (slot, arg) {
            (b'd', Arg::Int(n)) => acc.int(n),
            (b'u', Arg::Uint(n)) => acc.uint(n),
            (b's', Arg::Raw(s)) => acc.atom(s),
            (b'F', Arg::Folder(mailbox)) => acc.folder(mailbox),
            (b'S', Arg::String(s)) => acc.string(s),
            (b'Q', Arg::Quoted(s)) => acc.quoted(s),
            (b'L', Arg::Literal(literal)) => acc.literal(literal, append_like),
            (slot, arg) => {
                return Err(Error::Protocol(format!(
                    "Template slot %{} does not accept {arg:?}",
                    slot as char
                )));
            }
        }
    }

    if args.next().is_some() {
        return Err(Error::Protocol(
            "More arguments than template slots".to_string(),
        ));
    }

    Ok(acc.finish())
}

/// Estimates the encoded length of a templated command.
///
/// Mirrors [`build`] for the slots that appear in splittable commands
/// (`%d`, `%u`, `%s`); other slots contribute nothing. Callers batching UID
/// sets use this to keep each command under the configured line limit.
#[must_use]
pub fn estimate_length(template: &str, args: &[Arg<'_>]) -> usize {
    let mut total = 0;
    let mut arg_index = 0;

    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            total += 1;
            i += 1;
            continue;
        }
        i += 1;
        let Some(&slot) = bytes.get(i) else { break };
        i += 1;

        if slot == b'%' {
            total += 1;
            continue;
        }

        match args.get(arg_index) {
            Some(Arg::Int(n)) => total += n.to_string().len(),
            Some(Arg::Uint(n)) => total += n.to_string().len(),
            Some(Arg::Raw(s)) => total += s.len(),
            _ => {}
        }
        arg_index += 1;
    }

    total
}

/// Returns true for commands whose literals carry message content.
fn is_append_like(template: &str) -> bool {
    let verb = template
        .split_ascii_whitespace()
        .find(|word| !word.eq_ignore_ascii_case("UID"));
    verb.is_some_and(|v| v.eq_ignore_ascii_case("APPEND"))
}
