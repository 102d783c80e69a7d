//! Framed I/O for the IMAP wire.
//!
//! IMAP responses are CRLF-terminated lines that may embed literals. The
//! read path runs in line mode until a trailing `{n}` flips it into
//! byte-exact mode for the next n octets, then resumes line mode. The write
//! path is purely sequential and flushed at command-part boundaries.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for the IMAP protocol.
///
/// Handles line-based reading with literal support, buffered writing, and
/// the session read/write timeouts. IDLE lifts the read timeout and restores
/// it afterwards.
pub struct FramedStream<S> {
    reader: BufReader<S>,
    write_buffer: BytesMut,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream with no timeouts.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Returns the current read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Returns the current write timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Sets the read timeout (`None` waits forever).
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Sets the write timeout (`None` waits forever).
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    /// Reads a complete IMAP response, following embedded literals.
    ///
    /// Returns the raw bytes of the response: the line, any literal octets,
    /// and the continuation lines after them, up to the final CRLF.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_response_inner())
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.read_response_inner().await,
        }
    }

    async fn read_response_inner(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            // A trailing {n} switches to byte-exact mode for n octets
            if let Some(literal_len) = parse_literal_length(&line) {
                if literal_len > MAX_LITERAL_SIZE {
                    return Err(Error::Protocol(format!(
                        "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                let mut literal = vec![0u8; literal_len];
                self.reader.read_exact(&mut literal).await?;
                response.extend_from_slice(&literal);
                // Line mode resumes; the response is not over yet
            } else {
                break;
            }
        }

        Ok(response)
    }

    /// Reads a single CRLF-terminated line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = find_crlf(buf) {
                line.extend_from_slice(&buf[..pos + 2]);
                self.reader.consume(pos + 2);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes command bytes and flushes.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(data);

        match self.write_timeout {
            Some(limit) => {
                let fut = async {
                    let stream = self.reader.get_mut();
                    stream.write_all(&self.write_buffer).await?;
                    stream.flush().await?;
                    Ok::<(), Error>(())
                };
                tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| Error::Timeout(limit))?
            }
            None => {
                let stream = self.reader.get_mut();
                stream.write_all(&self.write_buffer).await?;
                stream.flush().await?;
                Ok(())
            }
        }
    }

    /// Writes raw bytes without flushing (literal chunks).
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        Ok(())
    }

    /// Streams a reader of known length into the transport.
    ///
    /// Returns the number of bytes copied, which the engine checks against
    /// the declared literal length.
    pub async fn write_stream(
        &mut self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64> {
        let stream = self.reader.get_mut();
        let copied = tokio::io::copy(reader, stream).await?;
        Ok(copied)
    }

    /// Flushes buffered writes.
    pub async fn flush(&mut self) -> Result<()> {
        self.reader.get_mut().flush().await?;
        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the framed stream and returns the inner transport.
    ///
    /// Used when swapping the transport in place (STARTTLS, compression).
    /// No byte may be in flight: buffered read data is discarded.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line (`{123}` or `{123+}`).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];

    let open = line.iter().rposition(|&b| b == b'{')?;

    if !line.ends_with(b"}") {
        return None;
    }

    let num_start = open + 1;
    let num_end = if line.ends_with(b"+}") {
        line.len() - 2
    } else {
        line.len() - 1
    };

    let num_str = std::str::from_utf8(&line[num_start..num_end]).ok()?;
    num_str.parse().ok()
}
