//! IMAP response parser.
//!
//! Parses server responses according to RFC 3501 grammar plus the extension
//! responses the engine understands (ESEARCH, SORT, THREAD, VANISHED,
//! ENABLED, NAMESPACE, QUOTA, ID, ACL, METADATA).

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::option_if_let_else)]

mod extensions;
mod fetch;
mod helpers;
mod thread;
mod types;

pub use types::{
    Address, Annotation, BodyStructure, Envelope, FetchItem, NamespaceEntry, Namespaces,
    QuotaResource, SearchResults, StatusItem, ThreadNode, UntaggedResponse,
};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use extensions::{
    parse_acl_response, parse_enabled_response, parse_esearch_response, parse_id_response,
    parse_metadata_response, parse_namespace_response, parse_quota_response,
    parse_quotaroot_response, parse_vanished_response,
};
use helpers::{
    parse_capability_data, parse_list_response, parse_response_code, parse_search_response,
    parse_status_response, read_text_until_crlf,
};
use thread::parse_thread_response;

// Re-export for the fetch submodule and engine-level parsing
pub(crate) use helpers::parse_flag_list;

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Response codes attached to the completion line.
        codes: Vec<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response line.
    pub fn parse(input: &[u8]) -> Result<Response> {
        Self::parse_in(input, false)
    }

    /// Parses a complete response line; `utf8` permits 8-bit atoms
    /// (UTF8=ACCEPT sessions).
    pub fn parse_in(input: &[u8], utf8: bool) -> Result<Response> {
        let mut lexer = if utf8 {
            Lexer::with_utf8(input)
        } else {
            Lexer::new(input)
        };

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Self::parse_continuation(&mut lexer),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    /// Parses a tagged response.
    fn parse_tagged(lexer: &mut Lexer<'_>, tag_str: &str) -> Result<Response> {
        lexer.expect_space()?;

        let status = Self::parse_status(lexer)?;
        lexer.expect_space()?;

        let (codes, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag_str),
            status,
            codes,
            text,
        })
    }

    /// Parses an untagged response.
    #[allow(clippy::too_many_lines)]
    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let token = lexer.next_token()?;

        match token {
            // Some servers emit a bare `* [CODE ...]` without the OK
            Token::LBracket => {
                let code = helpers::parse_response_code_body(lexer)?;
                if lexer.peek() == Some(b' ') {
                    lexer.advance();
                }
                let text = read_text_until_crlf(lexer);
                Ok(Response::Untagged(UntaggedResponse::Ok {
                    code: Some(code),
                    text,
                }))
            }
            Token::Atom(s) => {
                let upper = s.to_uppercase();
                match upper.as_str() {
                    "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                        lexer.expect_space()?;
                        let (codes, text) = Self::parse_resp_text(lexer)?;
                        let code = codes.into_iter().next();
                        let untagged = match upper.as_str() {
                            "OK" => UntaggedResponse::Ok { code, text },
                            "NO" => UntaggedResponse::No { code, text },
                            "BAD" => UntaggedResponse::Bad { code, text },
                            "PREAUTH" => UntaggedResponse::PreAuth { code, text },
                            _ => UntaggedResponse::Bye { code, text },
                        };
                        Ok(Response::Untagged(untagged))
                    }
                    "CAPABILITY" => {
                        let caps = parse_capability_data(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Capability(caps)))
                    }
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = parse_flag_list(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Flags(flags)))
                    }
                    "LIST" => {
                        lexer.expect_space()?;
                        let list = parse_list_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::List(list)))
                    }
                    "LSUB" => {
                        lexer.expect_space()?;
                        let list = parse_list_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Lsub(list)))
                    }
                    "SEARCH" => {
                        let (ids, mod_seq) = parse_search_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Search {
                            ids,
                            mod_seq,
                        }))
                    }
                    "ESEARCH" => {
                        let results = parse_esearch_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::ESearch(results)))
                    }
                    "SORT" => {
                        let (ids, _) = parse_search_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Sort(ids)))
                    }
                    "THREAD" => {
                        let roots = parse_thread_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Thread(roots)))
                    }
                    "STATUS" => {
                        lexer.expect_space()?;
                        let (mailbox, items) = parse_status_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Status {
                            mailbox,
                            items,
                        }))
                    }
                    "VANISHED" => {
                        let (earlier, uids) = parse_vanished_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Vanished {
                            earlier,
                            uids,
                        }))
                    }
                    "ENABLED" => {
                        let caps = parse_enabled_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Enabled(caps)))
                    }
                    "NAMESPACE" => {
                        lexer.expect_space()?;
                        let namespaces = parse_namespace_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Namespace(namespaces)))
                    }
                    "QUOTA" => {
                        lexer.expect_space()?;
                        let (root, resources) = parse_quota_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Quota {
                            root,
                            resources,
                        }))
                    }
                    "QUOTAROOT" => {
                        lexer.expect_space()?;
                        let (mailbox, roots) = parse_quotaroot_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::QuotaRoot {
                            mailbox,
                            roots,
                        }))
                    }
                    "ID" => {
                        lexer.expect_space()?;
                        let fields = parse_id_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Id(fields)))
                    }
                    "ACL" => {
                        lexer.expect_space()?;
                        let (mailbox, rights) = parse_acl_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Acl {
                            mailbox,
                            rights,
                        }))
                    }
                    "METADATA" => {
                        lexer.expect_space()?;
                        let (mailbox, entries) = parse_metadata_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Metadata {
                            mailbox,
                            entries,
                        }))
                    }
                    _ => Err(Error::Parse {
                        position: lexer.position(),
                        message: format!("Unknown untagged response: {s}"),
                    }),
                }
            }
            Token::Number(n) => {
                let n = u32::try_from(n).map_err(|_| Error::Parse {
                    position: lexer.position(),
                    message: "Message number exceeds 32 bits".to_string(),
                })?;
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                let upper = keyword.to_uppercase();

                match upper.as_str() {
                    "EXISTS" => Ok(Response::Untagged(UntaggedResponse::Exists(n))),
                    "RECENT" => Ok(Response::Untagged(UntaggedResponse::Recent(n))),
                    "EXPUNGE" => {
                        let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid sequence number 0".to_string(),
                        })?;
                        Ok(Response::Untagged(UntaggedResponse::Expunge(seq)))
                    }
                    "FETCH" => {
                        let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: "Invalid sequence number 0".to_string(),
                        })?;
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_response(lexer)?;
                        Ok(Response::Untagged(UntaggedResponse::Fetch { seq, items }))
                    }
                    _ => Err(Error::Parse {
                        position: lexer.position(),
                        message: format!("Unknown message data: {keyword}"),
                    }),
                }
            }
            _ => Err(Error::Parse {
                position: lexer.position(),
                message: format!("Unexpected token in untagged response: {token:?}"),
            }),
        }
    }

    /// Parses a continuation response.
    fn parse_continuation(lexer: &mut Lexer<'_>) -> Result<Response> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let text = read_text_until_crlf(lexer);

        Ok(Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        })
    }

    /// Parses a status keyword.
    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(Error::Parse {
                position: lexer.position(),
                message: format!("Invalid status: {s}"),
            }),
        }
    }

    /// Parses response text with optional leading response codes.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Vec<ResponseCode>, String)> {
        let mut codes = Vec::new();
        while lexer.peek() == Some(b'[') {
            codes.push(parse_response_code(lexer)?);
            if lexer.peek() == Some(b' ') {
                lexer.advance();
            }
        }

        let text = read_text_until_crlf(lexer);

        Ok((codes, text))
    }
}
