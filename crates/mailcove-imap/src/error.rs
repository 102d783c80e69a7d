//! Error types for the IMAP protocol engine.

use std::time::Duration;

use thiserror::Error;

use crate::types::ResponseCode;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations. Fatal: the engine disconnects.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Wire syntax error. Fatal: the engine disconnects.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// LOGIN or AUTHENTICATE was rejected by the server.
    #[error("Authentication failed: {text}")]
    Auth {
        /// Result text from the tagged completion.
        text: String,
        /// Reason string from an `[AUTH...]` response code, when present.
        reason: Option<String>,
    },

    /// Server returned NO (operational failure). The connection stays usable.
    #[error("{command} failed: {text}")]
    No {
        /// Name of the command that failed.
        command: String,
        /// Result text from the tagged completion.
        text: String,
        /// Response codes attached to the completion line.
        codes: Vec<ResponseCode>,
    },

    /// Server returned BAD (server-side syntax error).
    #[error("{command} rejected: {text}")]
    Bad {
        /// Name of the command that was rejected.
        command: String,
        /// Result text from the tagged completion.
        text: String,
    },

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Blocking I/O exceeded the configured limit.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Operation is illegal in the current engine state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Another command is already active on this engine.
    #[error("Engine is busy with another command")]
    Busy,

    /// Feature requires a capability the server has not advertised.
    #[error("Server does not support {0}")]
    Unsupported(&'static str),

    /// Caller-initiated cancellation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Protocol violation or unexpected data. Fatal: the engine disconnects.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if this error leaves the connection unusable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::Parse { .. }
                | Self::Protocol(_)
                | Self::Bye(_)
                | Self::Cancelled
                | Self::Timeout(_)
        )
    }

    /// Returns the `BADCHARSET` charset list if this error carries one.
    #[must_use]
    pub fn bad_charset(&self) -> Option<&[String]> {
        if let Self::No { codes, .. } = self {
            for code in codes {
                if let ResponseCode::BadCharset(charsets) = code {
                    return Some(charsets);
                }
            }
        }
        None
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn no_error_formats_command_name() {
        let err = Error::No {
            command: "SELECT".to_string(),
            text: "no such mailbox".to_string(),
            codes: vec![],
        };
        assert_eq!(err.to_string(), "SELECT failed: no such mailbox");
        assert!(!err.is_fatal());
    }

    #[test]
    fn protocol_errors_are_fatal() {
        assert!(Error::Protocol("unexpected token".to_string()).is_fatal());
        assert!(Error::Cancelled.is_fatal());
        assert!(
            !Error::Bad {
                command: "FETCH".to_string(),
                text: "parse error".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn bad_charset_extracts_list() {
        let err = Error::No {
            command: "UID SEARCH".to_string(),
            text: "UTF-8 not supported".to_string(),
            codes: vec![ResponseCode::BadCharset(vec!["US-ASCII".to_string()])],
        };
        assert_eq!(err.bad_charset(), Some(&["US-ASCII".to_string()][..]));
        assert!(Error::Busy.bad_charset().is_none());
    }
}
