//! Parser helper functions for response codes and common productions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, ModSeq, ResponseCode, SeqNum,
    Uid, UidSet, UidValidity,
};
use crate::{Error, Result};

use super::types::StatusItem;

/// Parses a response code between brackets.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;
    parse_response_code_body(lexer)
}

/// Parses a response code whose opening bracket is already consumed.
pub fn parse_response_code_body(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    let atom = lexer.read_atom_string()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "UIDNOTSTICKY" => ResponseCode::UidNotSticky,
        "CLOSED" => ResponseCode::Closed,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let uid = read_nz_u32(lexer, "UIDNEXT").map(Uid)?;
            ResponseCode::UidNext(uid)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let validity = read_nz_u32(lexer, "UIDVALIDITY").map(UidValidity)?;
            ResponseCode::UidValidity(validity)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let seq = read_nz_u32(lexer, "UNSEEN").map(SeqNum)?;
            ResponseCode::Unseen(seq)
        }
        "HIGHESTMODSEQ" => {
            lexer.expect_space()?;
            let n = lexer.read_number64()?;
            let mod_seq = ModSeq::from_u64(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid HIGHESTMODSEQ 0".to_string(),
            })?;
            ResponseCode::HighestModSeq(mod_seq)
        }
        "MODIFIED" => {
            lexer.expect_space()?;
            let uids = read_uid_set(lexer)?;
            ResponseCode::Modified(uids)
        }
        "CAPABILITY" => {
            let caps = parse_capability_data(lexer)?;
            ResponseCode::Capability(caps)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            let flags = parse_flag_list(lexer)?;
            ResponseCode::PermanentFlags(flags.into_iter().cloned().collect())
        }
        "BADCHARSET" => {
            let mut charsets = Vec::new();
            if lexer.peek() == Some(b' ') {
                lexer.advance();
                if lexer.peek() == Some(b'(') {
                    lexer.expect(Token::LParen)?;
                    loop {
                        match lexer.next_token()? {
                            Token::RParen => break,
                            Token::Space => continue,
                            Token::Atom(s) => charsets.push(s.to_string()),
                            Token::QuotedString(s) => charsets.push(s),
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Unexpected token in BADCHARSET: {token:?}"),
                                });
                            }
                        }
                    }
                }
            }
            ResponseCode::BadCharset(charsets)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let uid_validity = read_nz_u32(lexer, "APPENDUID").map(UidValidity)?;
            lexer.expect_space()?;
            let uids = read_uid_set(lexer)?;
            ResponseCode::AppendUid { uid_validity, uids }
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let uid_validity = read_nz_u32(lexer, "COPYUID").map(UidValidity)?;
            lexer.expect_space()?;
            let source = read_uid_set(lexer)?;
            lexer.expect_space()?;
            let dest = read_uid_set(lexer)?;
            ResponseCode::CopyUid {
                uid_validity,
                source,
                dest,
            }
        }
        _ if upper.starts_with("AUTH") => {
            // AUTHENTICATIONFAILED, AUTHORIZATIONFAILED, and friends
            ResponseCode::AuthFailure(atom.to_string())
        }
        _ => {
            // Skip any payload of an unrecognised code
            while lexer.peek() != Some(b']') && !lexer.is_eof() {
                lexer.advance();
            }
            ResponseCode::Unknown(atom.to_string())
        }
    };

    // Tolerate trailing payload some servers attach to known codes
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Reads a non-zero 32-bit number.
fn read_nz_u32(lexer: &mut Lexer<'_>, what: &str) -> Result<std::num::NonZeroU32> {
    let n = lexer.read_number()?;
    std::num::NonZeroU32::new(n).ok_or_else(|| Error::Parse {
        position: lexer.position(),
        message: format!("Invalid {what} 0"),
    })
}

/// Reads a UID set token (`4392`, `2:9`, or `1,3:5,8`).
pub fn read_uid_set(lexer: &mut Lexer<'_>) -> Result<UidSet> {
    let raw = match lexer.next_token()? {
        Token::Number(n) => n.to_string(),
        Token::Atom(s) => s.to_string(),
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("Expected UID set, got {token:?}"),
            });
        }
    };
    UidSet::parse(&raw).ok_or_else(|| Error::Parse {
        position: lexer.position(),
        message: format!("Invalid UID set: {raw}"),
    })
}

/// Parses capability data (space-separated atoms to end of line).
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a parenthesised flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Asterisk => {
                // `\*` tokenizes as Atom("\\") Asterisk; fold it back
                flags.remove(&Flag::Keyword("\\".to_string()));
                flags.insert(Flag::Wildcard);
            }
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in flag list: {token:?}"),
                });
            }
        }
    }

    Ok(flags)
}

/// Parses a LIST/LSUB response body.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in LIST attributes: {token:?}"),
                });
            }
        }
    }

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

    lexer.expect_space()?;

    let wire_name = lexer.read_astring()?;
    let mailbox = Mailbox::decode_utf7(&wire_name).unwrap_or_else(|| Mailbox::new(wire_name));

    Ok(ListResponse {
        attributes,
        delimiter,
        mailbox,
    })
}

/// Parses a SEARCH (or SORT) response: numbers with optional `(MODSEQ n)`.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<(Vec<u32>, Option<ModSeq>)> {
    let mut ids = Vec::new();
    let mut mod_seq = None;

    loop {
        lexer.skip_spaces();
        match lexer.peek() {
            Some(b'0'..=b'9') => {
                ids.push(lexer.read_number()?);
            }
            Some(b'(') => {
                lexer.expect(Token::LParen)?;
                let keyword = lexer.read_atom_string()?;
                if !keyword.eq_ignore_ascii_case("MODSEQ") {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: format!("Expected MODSEQ, got {keyword}"),
                    });
                }
                lexer.expect_space()?;
                let n = lexer.read_number64()?;
                mod_seq = ModSeq::from_u64(n);
                lexer.expect(Token::RParen)?;
            }
            _ => break,
        }
    }

    Ok((ids, mod_seq))
}

/// Parses a STATUS response body.
pub fn parse_status_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, Vec<StatusItem>)> {
    let wire_name = lexer.read_astring()?;
    let mailbox = Mailbox::decode_utf7(&wire_name).unwrap_or_else(|| Mailbox::new(wire_name));
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                lexer.expect_space()?;
                let value = lexer.read_number64()?;

                let item = match name.to_uppercase().as_str() {
                    "MESSAGES" => StatusItem::Messages(truncate_u32(lexer, value)?),
                    "RECENT" => StatusItem::Recent(truncate_u32(lexer, value)?),
                    "UIDNEXT" => {
                        let n = truncate_u32(lexer, value)?;
                        match Uid::new(n) {
                            Some(uid) => StatusItem::UidNext(uid),
                            None => continue,
                        }
                    }
                    "UIDVALIDITY" => {
                        let n = truncate_u32(lexer, value)?;
                        match UidValidity::new(n) {
                            Some(v) => StatusItem::UidValidity(v),
                            None => continue,
                        }
                    }
                    "UNSEEN" => StatusItem::Unseen(truncate_u32(lexer, value)?),
                    "HIGHESTMODSEQ" => match ModSeq::from_u64(value) {
                        Some(seq) => StatusItem::HighestModSeq(seq),
                        None => continue,
                    },
                    _ => continue,
                };
                items.push(item);
            }
            _ => continue,
        }
    }

    Ok((mailbox, items))
}

fn truncate_u32(lexer: &Lexer<'_>, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Parse {
        position: lexer.position(),
        message: "Number exceeds 32 bits".to_string(),
    })
}

/// Reads text until CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();

    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end);

    if lexer.peek() == Some(b'\r') {
        lexer.skip(2);
    }

    String::from_utf8_lossy(&remaining[..end]).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;

    #[test]
    fn response_code_uidvalidity() {
        let mut lexer = Lexer::new(b"[UIDVALIDITY 3857529045]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(
            code,
            ResponseCode::UidValidity(UidValidity::new(3857529045).unwrap())
        );
    }

    #[test]
    fn response_code_uidvalidity_zero_rejected() {
        let mut lexer = Lexer::new(b"[UIDVALIDITY 0]");
        assert!(parse_response_code(&mut lexer).is_err());
    }

    #[test]
    fn response_code_badcharset_with_list() {
        let mut lexer = Lexer::new(b"[BADCHARSET (US-ASCII \"ISO-8859-1\")]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(
            code,
            ResponseCode::BadCharset(vec!["US-ASCII".to_string(), "ISO-8859-1".to_string()])
        );
    }

    #[test]
    fn response_code_badcharset_bare() {
        let mut lexer = Lexer::new(b"[BADCHARSET]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(code, ResponseCode::BadCharset(vec![]));
    }

    #[test]
    fn response_code_appenduid() {
        let mut lexer = Lexer::new(b"[APPENDUID 3857529045 4392]");
        let code = parse_response_code(&mut lexer).unwrap();
        if let ResponseCode::AppendUid { uid_validity, uids } = code {
            assert_eq!(uid_validity.get(), 3857529045);
            assert_eq!(format!("{uids}"), "4392");
        } else {
            panic!("Expected AppendUid");
        }
    }

    #[test]
    fn response_code_copyuid_with_ranges() {
        let mut lexer = Lexer::new(b"[COPYUID 38505 304,319:320 3956:3958]");
        let code = parse_response_code(&mut lexer).unwrap();
        if let ResponseCode::CopyUid { source, dest, .. } = code {
            assert_eq!(source.count(), 3);
            assert_eq!(dest.count(), 3);
        } else {
            panic!("Expected CopyUid");
        }
    }

    #[test]
    fn response_code_modified() {
        let mut lexer = Lexer::new(b"[MODIFIED 7,9]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(code, ResponseCode::Modified(UidSet::parse("7,9").unwrap()));
    }

    #[test]
    fn response_code_highestmodseq() {
        let mut lexer = Lexer::new(b"[HIGHESTMODSEQ 715194045007]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(
            code,
            ResponseCode::HighestModSeq(ModSeq::from_u64(715194045007).unwrap())
        );
    }

    #[test]
    fn response_code_auth_failure() {
        let mut lexer = Lexer::new(b"[AUTHENTICATIONFAILED]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(
            code,
            ResponseCode::AuthFailure("AUTHENTICATIONFAILED".to_string())
        );
    }

    #[test]
    fn response_code_unknown_skips_payload() {
        let mut lexer = Lexer::new(b"[XWHATEVER 1 2 3]");
        let code = parse_response_code(&mut lexer).unwrap();
        assert_eq!(code, ResponseCode::Unknown("XWHATEVER".to_string()));
    }

    #[test]
    fn search_response_with_modseq() {
        let mut lexer = Lexer::new(b" 2 5 6 (MODSEQ 917162500)");
        let (ids, mod_seq) = parse_search_response(&mut lexer).unwrap();
        assert_eq!(ids, vec![2, 5, 6]);
        assert_eq!(mod_seq.unwrap().get(), 917162500);
    }

    #[test]
    fn search_response_empty() {
        let mut lexer = Lexer::new(b"\r\n");
        let (ids, mod_seq) = parse_search_response(&mut lexer).unwrap();
        assert!(ids.is_empty());
        assert!(mod_seq.is_none());
    }

    #[test]
    fn status_with_highestmodseq() {
        let mut lexer = Lexer::new(b"blurdybloop (MESSAGES 231 UIDNEXT 44292 HIGHESTMODSEQ 7011231777)");
        let (mailbox, items) = parse_status_response(&mut lexer).unwrap();
        assert_eq!(mailbox.as_str(), "blurdybloop");
        assert!(items.contains(&StatusItem::Messages(231)));
        assert!(
            items
                .iter()
                .any(|i| matches!(i, StatusItem::HighestModSeq(m) if m.get() == 7011231777))
        );
    }

    #[test]
    fn list_decodes_utf7_names() {
        let mut lexer = Lexer::new(b"(\\HasNoChildren) \"/\" \"Entw&APw-rfe\"");
        let list = parse_list_response(&mut lexer).unwrap();
        assert_eq!(list.mailbox.as_str(), "Entw\u{fc}rfe");
        assert_eq!(list.delimiter, Some('/'));
    }

    #[test]
    fn permanent_flags_with_wildcard() {
        let mut lexer = Lexer::new(b"[PERMANENTFLAGS (\\Deleted \\Seen \\*)]");
        let code = parse_response_code(&mut lexer).unwrap();
        if let ResponseCode::PermanentFlags(flags) = code {
            assert!(flags.contains(&Flag::Deleted));
            assert!(flags.contains(&Flag::Wildcard));
        } else {
            panic!("Expected PermanentFlags");
        }
    }
}
