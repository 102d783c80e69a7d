//! FETCH response parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ModSeq, Uid};
use crate::{Error, Result};

use super::parse_flag_list;
use super::types::{Address, Annotation, BodyStructure, Envelope, FetchItem};

/// Parses the parenthesised item list of a FETCH response.
///
/// Unknown item names are a hard error: silently skipping one would leave the
/// token stream misaligned for whatever value follows.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                let upper = name.to_uppercase();
                match upper.as_str() {
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = parse_flag_list(lexer)?;
                        items.push(FetchItem::Flags(flags));
                    }
                    "UID" => {
                        lexer.expect_space()?;
                        let n = lexer.read_number()?;
                        let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: format!("invalid UID value: {n} (UID cannot be 0)"),
                        })?;
                        items.push(FetchItem::Uid(uid));
                    }
                    "RFC822.SIZE" => {
                        lexer.expect_space()?;
                        let size = lexer.read_number()?;
                        items.push(FetchItem::Rfc822Size(size));
                    }
                    "INTERNALDATE" => {
                        lexer.expect_space()?;
                        match lexer.next_token()? {
                            Token::QuotedString(date) => {
                                items.push(FetchItem::InternalDate(date));
                            }
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Expected INTERNALDATE string, got {token:?}"),
                                });
                            }
                        }
                    }
                    "ENVELOPE" => {
                        lexer.expect_space()?;
                        let envelope = parse_envelope(lexer)?;
                        items.push(FetchItem::Envelope(Box::new(envelope)));
                    }
                    "BODYSTRUCTURE" => {
                        lexer.expect_space()?;
                        let body_structure = parse_body_structure(lexer)?;
                        items.push(FetchItem::BodyStructure(body_structure));
                    }
                    "BODY" => {
                        // Either BODY[section]<origin> content or the
                        // non-extensible BODY structure form
                        if lexer.peek() == Some(b'[') {
                            let (section, origin) = parse_body_section_and_origin(lexer)?;
                            lexer.expect_space()?;
                            let data = match lexer.next_token()? {
                                Token::Literal(d) => Some(d),
                                Token::QuotedString(s) => Some(s.into_bytes()),
                                Token::Nil => None,
                                token => {
                                    return Err(Error::Parse {
                                        position: lexer.position(),
                                        message: format!("Expected body content, got {token:?}"),
                                    });
                                }
                            };
                            items.push(FetchItem::Body {
                                section,
                                origin,
                                data,
                            });
                        } else {
                            lexer.expect_space()?;
                            let body_structure = parse_body_structure(lexer)?;
                            items.push(FetchItem::BodyStructure(body_structure));
                        }
                    }
                    "MODSEQ" => {
                        lexer.expect_space()?;
                        lexer.expect(Token::LParen)?;
                        let n = lexer.read_number64()?;
                        let mod_seq = ModSeq::from_u64(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid MODSEQ 0".to_string(),
                        })?;
                        lexer.expect(Token::RParen)?;
                        items.push(FetchItem::ModSeq(mod_seq));
                    }
                    "X-GM-MSGID" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::GmailMessageId(lexer.read_number64()?));
                    }
                    "X-GM-THRID" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::GmailThreadId(lexer.read_number64()?));
                    }
                    "X-GM-LABELS" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::GmailLabels(parse_label_list(lexer)?));
                    }
                    "EMAILID" => {
                        lexer.expect_space()?;
                        lexer.expect(Token::LParen)?;
                        let id = lexer.read_astring()?;
                        lexer.expect(Token::RParen)?;
                        items.push(FetchItem::EmailId(id));
                    }
                    "THREADID" => {
                        lexer.expect_space()?;
                        let id = match lexer.next_token()? {
                            Token::Nil => None,
                            Token::LParen => {
                                let id = lexer.read_astring()?;
                                lexer.expect(Token::RParen)?;
                                Some(id)
                            }
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Expected THREADID, got {token:?}"),
                                });
                            }
                        };
                        items.push(FetchItem::ThreadId(id));
                    }
                    "SAVEDATE" => {
                        lexer.expect_space()?;
                        let date = match lexer.next_token()? {
                            Token::Nil => None,
                            Token::QuotedString(s) => Some(s),
                            token => {
                                return Err(Error::Parse {
                                    position: lexer.position(),
                                    message: format!("Expected SAVEDATE string, got {token:?}"),
                                });
                            }
                        };
                        items.push(FetchItem::SaveDate(date));
                    }
                    "PREVIEW" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Preview(lexer.read_nstring()?));
                    }
                    "ANNOTATION" => {
                        lexer.expect_space()?;
                        items.push(FetchItem::Annotation(parse_annotations(lexer)?));
                    }
                    _ => {
                        return Err(Error::Parse {
                            position: lexer.position(),
                            message: format!("Unknown FETCH item: {name}"),
                        });
                    }
                }
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in FETCH items: {token:?}"),
                });
            }
        }
    }

    Ok(items)
}

/// Parses optional `[section]` and `<origin>` from a BODY fetch response.
fn parse_body_section_and_origin(lexer: &mut Lexer<'_>) -> Result<(Option<String>, Option<u32>)> {
    let mut section = None;
    let mut origin = None;

    if lexer.peek() == Some(b'[') {
        lexer.advance();

        let mut section_buf = String::new();
        loop {
            match lexer.peek() {
                Some(b']') => {
                    lexer.advance();
                    break;
                }
                Some(b) => {
                    section_buf.push(b as char);
                    lexer.advance();
                }
                None => break,
            }
        }

        if !section_buf.is_empty() {
            section = Some(section_buf);
        }
    }

    if lexer.peek() == Some(b'<') {
        lexer.advance();

        let mut origin_buf = String::new();
        loop {
            match lexer.peek() {
                Some(b'>') => {
                    lexer.advance();
                    break;
                }
                Some(b) if b.is_ascii_digit() => {
                    origin_buf.push(b as char);
                    lexer.advance();
                }
                _ => break,
            }
        }

        if !origin_buf.is_empty() {
            origin = origin_buf.parse().ok();
        }
    }

    Ok((section, origin))
}

/// Parses an envelope structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;

    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;

    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;

    let message_id = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

/// Parses an address list.
pub fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();

            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => {
                        addresses.push(parse_address(lexer)?);
                    }
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => break,
                }
            }

            Ok(addresses)
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected address list, got {token:?}"),
        }),
    }
}

/// Parses a single address.
pub fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;

    let name = lexer.read_nstring()?;
    lexer.expect_space()?;

    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;

    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;

    let host = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

/// Parses a parenthesised list of Gmail labels.
fn parse_label_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect(Token::LParen)?;

    let mut labels = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(s) => labels.push(s.to_string()),
            Token::QuotedString(s) => labels.push(s),
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in label list: {token:?}"),
                });
            }
        }
    }
    Ok(labels)
}

/// Parses annotation data: `(entry (attr value ...) ...)`.
fn parse_annotations(lexer: &mut Lexer<'_>) -> Result<Vec<Annotation>> {
    lexer.expect(Token::LParen)?;

    let mut annotations = Vec::new();
    loop {
        lexer.skip_spaces();
        if lexer.peek() == Some(b')') {
            lexer.advance();
            break;
        }

        let entry = lexer.read_astring()?;
        lexer.expect_space()?;
        lexer.expect(Token::LParen)?;

        let mut attributes = Vec::new();
        loop {
            lexer.skip_spaces();
            if lexer.peek() == Some(b')') {
                lexer.advance();
                break;
            }
            let attr = lexer.read_astring()?;
            lexer.expect_space()?;
            let value = lexer.read_nstring()?;
            attributes.push((attr, value));
        }

        annotations.push(Annotation { entry, attributes });
    }

    Ok(annotations)
}

/// Parses a BODYSTRUCTURE response.
///
/// Handles single-part bodies, text bodies with line counts, and nested
/// multiparts. Trailing extension data (MD5, disposition, language, location)
/// is skipped.
pub fn parse_body_structure(lexer: &mut Lexer<'_>) -> Result<BodyStructure> {
    lexer.expect(Token::LParen)?;

    if lexer.peek() == Some(b'(') {
        // Multipart
        let mut parts = Vec::new();
        while lexer.peek() == Some(b'(') {
            parts.push(parse_body_structure(lexer)?);
            if lexer.peek() == Some(b' ') {
                lexer.advance();
            }
        }

        let subtype = lexer.read_nstring()?.unwrap_or_default().to_uppercase();

        skip_to_close_paren(lexer)?;

        Ok(BodyStructure::Multipart {
            bodies: parts,
            subtype,
        })
    } else {
        let media_type = lexer.read_nstring()?.unwrap_or_default().to_uppercase();
        lexer.expect_space()?;

        let media_subtype = lexer.read_nstring()?.unwrap_or_default().to_uppercase();
        lexer.expect_space()?;

        let params = parse_body_params(lexer)?;
        lexer.expect_space()?;

        let id = lexer.read_nstring()?;
        lexer.expect_space()?;

        let description = lexer.read_nstring()?;
        lexer.expect_space()?;

        let encoding = lexer.read_nstring()?.unwrap_or_default();
        lexer.expect_space()?;

        let size = lexer.read_number()?;

        let lines = if media_type == "TEXT" {
            if lexer.peek() == Some(b' ') {
                lexer.advance();
                Some(lexer.read_number()?)
            } else {
                None
            }
        } else {
            None
        };

        skip_to_close_paren(lexer)?;

        if media_type == "TEXT" {
            Ok(BodyStructure::Text {
                subtype: media_subtype,
                params,
                id,
                description,
                encoding,
                size,
                lines: lines.unwrap_or(0),
            })
        } else {
            Ok(BodyStructure::Basic {
                media_type,
                media_subtype,
                params,
                id,
                description,
                encoding,
                size,
            })
        }
    }
}

/// Parses body parameters (NIL or (key value key value ...)).
fn parse_body_params(lexer: &mut Lexer<'_>) -> Result<Vec<(String, String)>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut params = Vec::new();
            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => {
                        let key = lexer.read_nstring()?.unwrap_or_default();
                        if lexer.peek() == Some(b' ') {
                            lexer.advance();
                        }
                        let value = lexer.read_nstring()?.unwrap_or_default();
                        params.push((key, value));
                    }
                }
            }
            Ok(params)
        }
        _ => Ok(Vec::new()),
    }
}

/// Skips to the closing parenthesis at the current nesting level.
fn skip_to_close_paren(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 1;
    while depth > 0 {
        match lexer.peek() {
            Some(b'(') => {
                depth += 1;
                lexer.advance();
            }
            Some(b')') => {
                depth -= 1;
                lexer.advance();
            }
            Some(b'{') => {
                let _ = lexer.next_token()?;
            }
            Some(_) => {
                lexer.advance();
            }
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use crate::types::Flag;

    #[test]
    fn fetch_uid_and_flags() {
        let data = b"(UID 123 FLAGS (\\Seen))";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 123));
        assert!(matches!(&items[1], FetchItem::Flags(f) if f.contains(&Flag::Seen)));
    }

    #[test]
    fn fetch_uid_zero_rejected() {
        let data = b"(UID 0)";
        let mut lexer = Lexer::new(data);
        assert!(parse_fetch_response(&mut lexer).is_err());
    }

    #[test]
    fn fetch_unknown_item_fails() {
        let data = b"(XNONSTANDARD 5)";
        let mut lexer = Lexer::new(data);
        let result = parse_fetch_response(&mut lexer);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unknown FETCH item")
        );
    }

    #[test]
    fn fetch_body_section_with_literal() {
        let data = b"(BODY[TEXT]<100> {5}\r\nhello)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        if let FetchItem::Body {
            section,
            origin,
            data,
        } = &items[0]
        {
            assert_eq!(section.as_deref(), Some("TEXT"));
            assert_eq!(*origin, Some(100));
            assert_eq!(data.as_deref(), Some(&b"hello"[..]));
        } else {
            panic!("Expected Body item");
        }
    }

    #[test]
    fn fetch_modseq() {
        let data = b"(MODSEQ (12345))";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert!(matches!(items[0], FetchItem::ModSeq(m) if m.get() == 12345));
    }

    #[test]
    fn fetch_gmail_items() {
        let data = b"(X-GM-MSGID 1278455344230334865 X-GM-THRID 1278455344230334865 X-GM-LABELS (\"\\\\Inbox\" work))";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert!(matches!(
            items[0],
            FetchItem::GmailMessageId(1278455344230334865)
        ));
        assert!(matches!(
            items[1],
            FetchItem::GmailThreadId(1278455344230334865)
        ));
        if let FetchItem::GmailLabels(labels) = &items[2] {
            assert_eq!(labels.len(), 2);
            assert_eq!(labels[1], "work");
        } else {
            panic!("Expected labels");
        }
    }

    #[test]
    fn fetch_objectid_items() {
        let data = b"(EMAILID (M6d99ac3275bb4e) THREADID (T64b478a75b7ea9) UID 30)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert!(matches!(&items[0], FetchItem::EmailId(id) if id == "M6d99ac3275bb4e"));
        assert!(
            matches!(&items[1], FetchItem::ThreadId(Some(id)) if id == "T64b478a75b7ea9")
        );
    }

    #[test]
    fn fetch_savedate_and_preview() {
        let data = b"(SAVEDATE \" 7-Feb-2019 22:11:48 +0000\" PREVIEW NIL)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert!(matches!(&items[0], FetchItem::SaveDate(Some(_))));
        assert!(matches!(&items[1], FetchItem::Preview(None)));
    }

    #[test]
    fn fetch_annotation() {
        let data = b"(ANNOTATION (/comment (value.priv \"My comment\")))";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        if let FetchItem::Annotation(annotations) = &items[0] {
            assert_eq!(annotations[0].entry, "/comment");
            assert_eq!(
                annotations[0].attributes[0],
                ("value.priv".to_string(), Some("My comment".to_string()))
            );
        } else {
            panic!("Expected Annotation item");
        }
    }

    #[test]
    fn envelope_parses_nstrings() {
        let data = b"(\"date\" \"subject\" NIL NIL NIL NIL NIL NIL \"in-reply-to\" \"message-id\")";
        let mut lexer = Lexer::new(data);
        let envelope = parse_envelope(&mut lexer).unwrap();

        assert_eq!(envelope.date, Some("date".to_string()));
        assert_eq!(envelope.subject, Some("subject".to_string()));
        assert_eq!(envelope.message_id, Some("message-id".to_string()));
    }

    #[test]
    fn envelope_with_addresses() {
        let data = b"(NIL \"hi\" ((\"Joe\" NIL \"joe\" \"example.com\")) NIL NIL NIL NIL NIL NIL NIL)";
        let mut lexer = Lexer::new(data);
        let envelope = parse_envelope(&mut lexer).unwrap();

        assert_eq!(envelope.from.len(), 1);
        assert_eq!(
            envelope.from[0].email(),
            Some("joe@example.com".to_string())
        );
    }

    #[test]
    fn body_structure_text() {
        let data = b"(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 3028 92)";
        let mut lexer = Lexer::new(data);
        let body = parse_body_structure(&mut lexer).unwrap();

        if let BodyStructure::Text {
            subtype,
            size,
            lines,
            ..
        } = body
        {
            assert_eq!(subtype, "PLAIN");
            assert_eq!(size, 3028);
            assert_eq!(lines, 92);
        } else {
            panic!("Expected text body");
        }
    }

    #[test]
    fn body_structure_multipart() {
        let data = b"((\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 100 5)(\"TEXT\" \"HTML\" NIL NIL NIL \"7BIT\" 200 10) \"ALTERNATIVE\")";
        let mut lexer = Lexer::new(data);
        let body = parse_body_structure(&mut lexer).unwrap();

        if let BodyStructure::Multipart { bodies, subtype } = body {
            assert_eq!(bodies.len(), 2);
            assert_eq!(subtype, "ALTERNATIVE");
        } else {
            panic!("Expected multipart body");
        }
    }
}
