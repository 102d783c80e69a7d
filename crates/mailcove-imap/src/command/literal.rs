//! Literal payloads: length-prefixed byte strings in the command stream.

use tokio::io::AsyncRead;

/// A literal payload to send after a `{N}` prefix.
///
/// Either an in-memory buffer or a streaming source whose encoded length is
/// known up front (a message produced by an external MIME writer). The exact
/// byte length is always known before transmission.
pub enum Literal {
    /// In-memory bytes.
    Bytes(Vec<u8>),
    /// Streaming source with a pre-computed length.
    Stream {
        /// Exact number of bytes the reader will produce.
        len: u64,
        /// The byte stream.
        reader: Box<dyn AsyncRead + Send + Unpin>,
    },
}

impl Literal {
    /// Returns the exact byte length of the payload.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::Stream { len, .. } => *len,
        }
    }

    /// Returns true for a zero-length literal (`{0}` is valid).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

impl From<Vec<u8>> for Literal {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Literal {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::Bytes(s.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_len() {
        let literal = Literal::from(b"HELLO".as_slice());
        assert_eq!(literal.len(), 5);
        assert!(!literal.is_empty());
    }

    #[test]
    fn empty_literal_is_valid() {
        let literal = Literal::Bytes(Vec::new());
        assert_eq!(literal.len(), 0);
        assert!(literal.is_empty());
    }

    #[test]
    fn stream_reports_declared_len() {
        let literal = Literal::Stream {
            len: 1234,
            reader: Box::new(tokio::io::empty()),
        };
        assert_eq!(literal.len(), 1234);
    }
}
