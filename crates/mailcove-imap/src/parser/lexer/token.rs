//! IMAP token types.

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom (unquoted string without special characters).
    Atom(&'a str),
    /// Quoted string.
    QuotedString(String),
    /// Literal string with size prefix {n}.
    Literal(Vec<u8>),
    /// Number.
    Number(u64),
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Opening bracket.
    LBracket,
    /// Closing bracket.
    RBracket,
    /// Space character.
    Space,
    /// Asterisk (untagged response prefix, list wildcard).
    Asterisk,
    /// Percent (non-recursive list wildcard).
    Percent,
    /// Plus (continuation response prefix).
    Plus,
    /// NIL literal.
    Nil,
    /// CRLF line ending.
    Crlf,
    /// End of input.
    Eof,
}

impl Token<'_> {
    /// Re-emits the token in wire form.
    ///
    /// Atoms, numbers, and punctuation emit verbatim; quoted strings re-apply
    /// escaping; literals emit a synchronising `{n}` prefix. Emitting every
    /// token of a tokenised line reproduces the line byte-for-byte apart from
    /// string-form normalisation.
    pub fn emit(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Atom(s) => buf.extend_from_slice(s.as_bytes()),
            Self::QuotedString(s) => {
                buf.push(b'"');
                for b in s.bytes() {
                    if b == b'"' || b == b'\\' {
                        buf.push(b'\\');
                    }
                    buf.push(b);
                }
                buf.push(b'"');
            }
            Self::Literal(data) => {
                buf.extend_from_slice(format!("{{{}}}\r\n", data.len()).as_bytes());
                buf.extend_from_slice(data);
            }
            Self::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
            Self::LParen => buf.push(b'('),
            Self::RParen => buf.push(b')'),
            Self::LBracket => buf.push(b'['),
            Self::RBracket => buf.push(b']'),
            Self::Space => buf.push(b' '),
            Self::Asterisk => buf.push(b'*'),
            Self::Percent => buf.push(b'%'),
            Self::Plus => buf.push(b'+'),
            Self::Nil => buf.extend_from_slice(b"NIL"),
            Self::Crlf => buf.extend_from_slice(b"\r\n"),
            Self::Eof => {}
        }
    }
}
