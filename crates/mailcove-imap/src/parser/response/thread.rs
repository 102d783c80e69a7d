//! THREAD response parsing (RFC 5256).

use crate::parser::lexer::Lexer;
use crate::{Error, Result};

use super::types::ThreadNode;

/// Parses the thread trees of a THREAD response.
///
/// `* THREAD (2)(3 6 (4 23)(44 7 96))` yields two roots: a lone message 2,
/// and 3→6 with two child branches.
pub fn parse_thread_response(lexer: &mut Lexer<'_>) -> Result<Vec<ThreadNode>> {
    let mut roots = Vec::new();

    loop {
        lexer.skip_spaces();
        match lexer.peek() {
            Some(b'(') => roots.push(parse_thread_node(lexer)?),
            _ => break,
        }
    }

    Ok(roots)
}

/// Parses one parenthesised thread branch.
fn parse_thread_node(lexer: &mut Lexer<'_>) -> Result<ThreadNode> {
    if lexer.advance() != Some(b'(') {
        return Err(Error::Parse {
            position: lexer.position(),
            message: "Expected ( in thread tree".to_string(),
        });
    }

    let mut ids = Vec::new();
    let mut children = Vec::new();

    loop {
        match lexer.peek() {
            Some(b')') => {
                lexer.advance();
                break;
            }
            Some(b' ') => {
                lexer.advance();
            }
            Some(b'(') => {
                children.push(parse_thread_node(lexer)?);
            }
            Some(b'0'..=b'9') => {
                let n = lexer.read_number()?;
                if n == 0 {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: "Invalid sequence number 0 in thread tree".to_string(),
                    });
                }
                ids.push(n);
            }
            _ => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: "Unexpected byte in thread tree".to_string(),
                });
            }
        }
    }

    Ok(ThreadNode { ids, children })
}
