//! Property tests for the round-trip and idempotence laws.

use proptest::prelude::*;

use mailcove_imap::parser::lexer::{Lexer, Token};
use mailcove_imap::search::{DateKind, NumericKind, SearchQuery, TextKind, optimize};
use mailcove_imap::types::{Mailbox, Uid, UidSet};

/// A generated wire token (owned, so strategies can build it).
#[derive(Debug, Clone)]
enum GenToken {
    Atom(String),
    Quoted(String),
    Literal(Vec<u8>),
    Number(u64),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Space,
    Asterisk,
    Percent,
    Plus,
}

impl GenToken {
    fn emit(&self, buf: &mut Vec<u8>) {
        let token = match self {
            Self::Atom(s) => Token::Atom(s.as_str()),
            Self::Quoted(s) => Token::QuotedString(s.clone()),
            Self::Literal(data) => Token::Literal(data.clone()),
            Self::Number(n) => Token::Number(*n),
            Self::LParen => Token::LParen,
            Self::RParen => Token::RParen,
            Self::LBracket => Token::LBracket,
            Self::RBracket => Token::RBracket,
            Self::Space => Token::Space,
            Self::Asterisk => Token::Asterisk,
            Self::Percent => Token::Percent,
            Self::Plus => Token::Plus,
        };
        token.emit(buf);
    }
}

fn atom_strategy() -> impl Strategy<Value = String> {
    // Atom characters the lexer accepts, excluding specials
    proptest::string::string_regex("[A-Za-z0-9.:=_-]{1,12}")
        .expect("valid regex")
}

fn quoted_strategy() -> impl Strategy<Value = String> {
    // Any printable text; escaping covers quotes and backslashes
    proptest::string::string_regex("[ -~]{0,20}").expect("valid regex")
}

fn token_strategy() -> impl Strategy<Value = GenToken> {
    prop_oneof![
        atom_strategy().prop_map(GenToken::Atom),
        quoted_strategy().prop_map(GenToken::Quoted),
        proptest::collection::vec(any::<u8>(), 0..32).prop_map(GenToken::Literal),
        (0u64..(1 << 63)).prop_map(GenToken::Number),
        Just(GenToken::LParen),
        Just(GenToken::RParen),
        Just(GenToken::LBracket),
        Just(GenToken::RBracket),
        Just(GenToken::Space),
        Just(GenToken::Asterisk),
        Just(GenToken::Percent),
        Just(GenToken::Plus),
    ]
}

proptest! {
    /// Tokenizing a valid line and re-emitting its tokens reproduces the
    /// line byte for byte.
    #[test]
    fn tokenize_then_emit_is_identity(tokens in proptest::collection::vec(token_strategy(), 0..16)) {
        let mut line = Vec::new();
        for token in &tokens {
            token.emit(&mut line);
            // Keep generated tokens from merging into one (two number runs
            // would concatenate into an overflowing digit sequence)
            line.push(b' ');
        }
        line.extend_from_slice(b"\r\n");

        let mut lexer = Lexer::new(&line);
        let mut emitted = Vec::new();
        loop {
            let token = lexer.next_token().expect("generated line must lex");
            if token == Token::Eof {
                break;
            }
            token.emit(&mut emitted);
        }

        prop_assert_eq!(emitted, line);
    }
}

fn leaf_query() -> impl Strategy<Value = SearchQuery> {
    prop_oneof![
        Just(SearchQuery::All),
        Just(SearchQuery::Unseen),
        Just(SearchQuery::Seen),
        Just(SearchQuery::Flagged),
        Just(SearchQuery::Deleted),
        Just(SearchQuery::Answered),
        "[a-zA-Z \u{e0}-\u{ff}]{0,12}"
            .prop_map(|s| SearchQuery::Text(TextKind::Subject, s)),
        "[a-z]{1,8}@[a-z]{1,8}"
            .prop_map(|s| SearchQuery::Text(TextKind::From, s)),
        Just(SearchQuery::Date(DateKind::Since, "1-Feb-1994".to_string())),
        (1u32..1_000_000).prop_map(|n| SearchQuery::Numeric(NumericKind::Larger, n)),
        (1u64..1_000_000).prop_map(SearchQuery::ModSeq),
    ]
}

fn query_strategy() -> impl Strategy<Value = SearchQuery> {
    leaf_query().prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(SearchQuery::And),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| SearchQuery::Or(Box::new(a), Box::new(b))),
            inner.prop_map(|q| SearchQuery::Not(Box::new(q))),
        ]
    })
}

proptest! {
    /// Optimising twice is the same as optimising once.
    #[test]
    fn optimize_is_idempotent(query in query_strategy()) {
        let once = optimize(query);
        let twice = optimize(once.clone());
        prop_assert_eq!(once, twice);
    }

    /// The optimiser never leaves an ALL inside a conjunction, a singleton
    /// AND, or a double negation.
    #[test]
    fn optimize_normal_form(query in query_strategy()) {
        fn well_formed(q: &SearchQuery) -> bool {
            match q {
                SearchQuery::And(items) => {
                    items.len() >= 2
                        && items.iter().all(|i| {
                            *i != SearchQuery::All
                                && !matches!(i, SearchQuery::And(_))
                                && well_formed(i)
                        })
                }
                SearchQuery::Or(a, b) => {
                    **a != SearchQuery::All
                        && **b != SearchQuery::All
                        && well_formed(a)
                        && well_formed(b)
                }
                SearchQuery::Not(inner) => {
                    !matches!(**inner, SearchQuery::Not(_)) && well_formed(inner)
                }
                _ => true,
            }
        }

        let optimized = optimize(query);
        prop_assert!(well_formed(&optimized));
    }
}

proptest! {
    /// Modified UTF-7 mailbox encoding round-trips arbitrary names.
    #[test]
    fn utf7_round_trip(name in "\\PC{0,24}") {
        let mailbox = Mailbox::new(name.clone());
        let encoded = mailbox.encode_utf7();
        // The wire form is pure printable ASCII
        prop_assert!(encoded.bytes().all(|b| (0x20..0x7f).contains(&b)));
        let decoded = Mailbox::decode_utf7(&encoded)
            .expect("engine-encoded names must decode");
        prop_assert_eq!(decoded.as_str(), name.as_str());
    }
}

proptest! {
    /// UID set display and parse are inverse.
    #[test]
    fn uid_set_round_trip(entries in proptest::collection::vec(
        prop_oneof![
            (1u32..10_000).prop_map(|n| (n, None)),
            ((1u32..10_000), (1u32..10_000)).prop_map(|(a, b)| (a, Some(b))),
        ],
        1..8,
    )) {
        let mut set = UidSet::new();
        for (start, end) in entries {
            let start = Uid::new(start).expect("non-zero");
            match end {
                Some(end) => set.push_range(start, Uid::new(end).expect("non-zero")),
                None => set.push(start),
            }
        }

        let wire = set.to_string();
        let parsed = UidSet::parse(&wire).expect("own display must parse");
        prop_assert_eq!(parsed, set);
    }
}
