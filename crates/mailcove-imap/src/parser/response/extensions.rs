//! Parsers for extension responses: ESEARCH, VANISHED, ENABLED, NAMESPACE,
//! QUOTA, ID, ACL, METADATA.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Mailbox, ModSeq, UidSet};
use crate::{Error, Result};

use super::helpers::read_uid_set;
use super::types::{NamespaceEntry, Namespaces, QuotaResource, SearchResults};

/// Parses an ESEARCH response (RFC 4731 / RFC 6203).
///
/// `* ESEARCH (TAG "A00000010") UID MIN 2 MAX 47 COUNT 17 ALL 2:9,12`
pub fn parse_esearch_response(lexer: &mut Lexer<'_>) -> Result<SearchResults> {
    let mut results = SearchResults::default();

    lexer.skip_spaces();

    // Optional search correlator
    if lexer.peek() == Some(b'(') {
        lexer.expect(Token::LParen)?;
        let keyword = lexer.read_atom_string()?;
        if !keyword.eq_ignore_ascii_case("TAG") {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected TAG in search correlator, got {keyword}"),
            });
        }
        lexer.expect_space()?;
        results.tag = Some(lexer.read_astring()?);
        lexer.expect(Token::RParen)?;
    }

    loop {
        lexer.skip_spaces();
        let token = lexer.next_token()?;
        let keyword = match token {
            Token::Atom(s) => s.to_uppercase(),
            Token::Crlf | Token::Eof => break,
            other => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in ESEARCH: {other:?}"),
                });
            }
        };

        match keyword.as_str() {
            "UID" => results.uid = true,
            "MIN" => {
                lexer.expect_space()?;
                results.min = Some(lexer.read_number()?);
            }
            "MAX" => {
                lexer.expect_space()?;
                results.max = Some(lexer.read_number()?);
            }
            "COUNT" => {
                lexer.expect_space()?;
                results.count = Some(lexer.read_number()?);
            }
            "ALL" => {
                lexer.expect_space()?;
                results.ids = Some(read_uid_set(lexer)?);
            }
            "MODSEQ" => {
                lexer.expect_space()?;
                let n = lexer.read_number64()?;
                results.mod_seq = ModSeq::from_u64(n);
            }
            "RELEVANCY" => {
                lexer.expect_space()?;
                results.relevancy = parse_relevancy(lexer)?;
            }
            _ => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unknown ESEARCH item: {keyword}"),
                });
            }
        }
    }

    Ok(results)
}

/// Parses relevancy scores: a bare number or a parenthesised list.
fn parse_relevancy(lexer: &mut Lexer<'_>) -> Result<Vec<u8>> {
    let mut scores = Vec::new();
    match lexer.next_token()? {
        Token::Number(n) => scores.push(clamp_score(lexer, n)?),
        Token::LParen => loop {
            match lexer.next_token()? {
                Token::RParen => break,
                Token::Space => continue,
                Token::Number(n) => scores.push(clamp_score(lexer, n)?),
                token => {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: format!("Unexpected token in RELEVANCY: {token:?}"),
                    });
                }
            }
        },
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected RELEVANCY scores, got {token:?}"),
            });
        }
    }
    Ok(scores)
}

fn clamp_score(lexer: &Lexer<'_>, n: u64) -> Result<u8> {
    if n > 100 {
        return Err(Error::Parse {
            position: lexer.position(),
            message: format!("Relevancy score out of range: {n}"),
        });
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok(n as u8)
}

/// Parses a VANISHED response (RFC 7162).
///
/// `* VANISHED (EARLIER) 300:310,405` or `* VANISHED 41`.
pub fn parse_vanished_response(lexer: &mut Lexer<'_>) -> Result<(bool, UidSet)> {
    lexer.skip_spaces();

    let mut earlier = false;
    if lexer.peek() == Some(b'(') {
        lexer.expect(Token::LParen)?;
        let keyword = lexer.read_atom_string()?;
        if !keyword.eq_ignore_ascii_case("EARLIER") {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected EARLIER, got {keyword}"),
            });
        }
        lexer.expect(Token::RParen)?;
        earlier = true;
        lexer.expect_space()?;
    }

    let uids = read_uid_set(lexer)?;
    Ok((earlier, uids))
}

/// Parses an ENABLED response (RFC 5161): capability atoms to end of line.
pub fn parse_enabled_response(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }
    Ok(caps)
}

/// Parses a NAMESPACE response (RFC 2342).
///
/// `* NAMESPACE (("" "/")) NIL (("#shared/" "/"))`
pub fn parse_namespace_response(lexer: &mut Lexer<'_>) -> Result<Namespaces> {
    let personal = parse_namespace_class(lexer)?;
    lexer.expect_space()?;
    let other_users = parse_namespace_class(lexer)?;
    lexer.expect_space()?;
    let shared = parse_namespace_class(lexer)?;

    Ok(Namespaces {
        personal,
        other_users,
        shared,
    })
}

fn parse_namespace_class(lexer: &mut Lexer<'_>) -> Result<Vec<NamespaceEntry>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut entries = Vec::new();
            loop {
                lexer.skip_spaces();
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => {
                        lexer.expect(Token::LParen)?;
                        let prefix = lexer.read_astring()?;
                        lexer.expect_space()?;
                        let delimiter = match lexer.next_token()? {
                            Token::Nil => None,
                            Token::QuotedString(s) => s.chars().next(),
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Expected delimiter, got {token:?}"),
                                });
                            }
                        };
                        // Skip namespace-response extensions
                        let mut depth = 1;
                        while depth > 0 {
                            match lexer.advance() {
                                Some(b'(') => depth += 1,
                                Some(b')') => depth -= 1,
                                Some(_) => {}
                                None => {
                                    return Err(Error::Parse {
                                        position: lexer.position(),
                                        message: "Unterminated namespace entry".to_string(),
                                    });
                                }
                            }
                        }
                        entries.push(NamespaceEntry { prefix, delimiter });
                    }
                    _ => {
                        return Err(Error::Parse {
                            position: lexer.position(),
                            message: "Unexpected byte in namespace list".to_string(),
                        });
                    }
                }
            }
            Ok(entries)
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected namespace class, got {token:?}"),
        }),
    }
}

/// Parses a QUOTA response (RFC 2087).
///
/// `* QUOTA "" (STORAGE 10 512)`
pub fn parse_quota_response(lexer: &mut Lexer<'_>) -> Result<(String, Vec<QuotaResource>)> {
    let root = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut resources = Vec::new();
    loop {
        lexer.skip_spaces();
        if lexer.peek() == Some(b')') {
            lexer.advance();
            break;
        }
        let name = lexer.read_atom_string()?.to_uppercase();
        lexer.expect_space()?;
        let usage = lexer.read_number64()?;
        lexer.expect_space()?;
        let limit = lexer.read_number64()?;
        resources.push(QuotaResource { name, usage, limit });
    }

    Ok((root, resources))
}

/// Parses a QUOTAROOT response: mailbox plus zero or more root names.
pub fn parse_quotaroot_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<String>)> {
    let wire_name = lexer.read_astring()?;
    let mailbox = Mailbox::decode_utf7(&wire_name).unwrap_or_else(|| Mailbox::new(wire_name));

    let mut roots = Vec::new();
    loop {
        lexer.skip_spaces();
        match lexer.peek() {
            None | Some(b'\r') => break,
            _ => roots.push(lexer.read_astring()?),
        }
    }

    Ok((mailbox, roots))
}

/// Parses an ID response (RFC 2971): NIL or a field/value list.
pub fn parse_id_response(lexer: &mut Lexer<'_>) -> Result<Option<Vec<(String, Option<String>)>>> {
    match lexer.next_token()? {
        Token::Nil => Ok(None),
        Token::LParen => {
            let mut fields = Vec::new();
            loop {
                lexer.skip_spaces();
                if lexer.peek() == Some(b')') {
                    lexer.advance();
                    break;
                }
                let field = lexer.read_astring()?;
                lexer.expect_space()?;
                let value = lexer.read_nstring()?;
                fields.push((field, value));
            }
            Ok(Some(fields))
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected ID list, got {token:?}"),
        }),
    }
}

/// Parses an ACL response (RFC 4314): mailbox plus identifier/rights pairs.
pub fn parse_acl_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<(String, String)>)> {
    let wire_name = lexer.read_astring()?;
    let mailbox = Mailbox::decode_utf7(&wire_name).unwrap_or_else(|| Mailbox::new(wire_name));

    let mut rights = Vec::new();
    loop {
        lexer.skip_spaces();
        match lexer.peek() {
            None | Some(b'\r') => break,
            _ => {
                let identifier = lexer.read_astring()?;
                lexer.expect_space()?;
                let grant = lexer.read_astring()?;
                rights.push((identifier, grant));
            }
        }
    }

    Ok((mailbox, rights))
}

/// Parses a METADATA response (RFC 5464).
///
/// Either the value form `* METADATA "" (/shared/comment "my comment")` or
/// the unsolicited entry-list form `* METADATA "" /shared/comment`.
pub fn parse_metadata_response(
    lexer: &mut Lexer<'_>,
) -> Result<(Mailbox, Vec<(String, Option<String>)>)> {
    let wire_name = lexer.read_astring()?;
    let mailbox = Mailbox::decode_utf7(&wire_name).unwrap_or_else(|| Mailbox::new(wire_name));
    lexer.expect_space()?;

    let mut entries = Vec::new();
    if lexer.peek() == Some(b'(') {
        lexer.expect(Token::LParen)?;
        loop {
            lexer.skip_spaces();
            if lexer.peek() == Some(b')') {
                lexer.advance();
                break;
            }
            let entry = lexer.read_astring()?;
            lexer.expect_space()?;
            let value = lexer.read_nstring()?;
            entries.push((entry, value));
        }
    } else {
        loop {
            lexer.skip_spaces();
            match lexer.peek() {
                None | Some(b'\r') => break,
                _ => entries.push((lexer.read_astring()?, None)),
            }
        }
    }

    Ok((mailbox, entries))
}
