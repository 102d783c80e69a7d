//! Connection configuration.

use std::time::Duration;

use crate::{Error, Result};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Insert a DEFLATE layer when the server advertises COMPRESS=DEFLATE.
    pub compress: bool,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read/write timeout for commands.
    pub io_timeout: Duration,
    /// Line-length ceiling callers use when splitting batched commands.
    pub line_limit: usize,
}

/// The RFC 7162 recommended command-line ceiling in octets.
pub const DEFAULT_LINE_LIMIT: usize = 8192;

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 993,
            security: Security::Implicit,
            compress: false,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            line_limit: DEFAULT_LINE_LIMIT,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Parses an `imap://` or `imaps://` URI.
    ///
    /// Query options: `starttls={true,false}` (default true for `imap`) and
    /// `compress={true,false}` (default true when STARTTLS is not in play;
    /// the engine still requires COMPRESS=DEFLATE to be advertised).
    pub fn from_uri(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| Error::Protocol(format!("Invalid IMAP URI: {uri}")))?;

        let implicit_tls = match scheme.to_ascii_lowercase().as_str() {
            "imap" => false,
            "imaps" => true,
            other => {
                return Err(Error::Protocol(format!("Unknown URI scheme: {other}")));
            }
        };

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let authority = authority.trim_end_matches('/');

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| Error::Protocol(format!("Invalid port in URI: {p}")))?;
                (h, Some(port))
            }
            None => (authority, None),
        };
        if host.is_empty() {
            return Err(Error::Protocol(format!("Missing host in URI: {uri}")));
        }

        let mut starttls = !implicit_tls;
        let mut compress = None;
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
                let flag = value.eq_ignore_ascii_case("true");
                match key.to_ascii_lowercase().as_str() {
                    "starttls" if !implicit_tls => starttls = flag,
                    "starttls" => {}
                    "compress" => compress = Some(flag),
                    _ => {}
                }
            }
        }

        let security = if implicit_tls {
            Security::Implicit
        } else if starttls {
            Security::StartTls
        } else {
            Security::None
        };

        // Compression defaults on only when STARTTLS was not used
        let compress = compress.unwrap_or(!starttls && !implicit_tls);

        let mut config = Self::new(host);
        config.security = security;
        config.port = port.unwrap_or_else(|| security.default_port());
        config.compress = compress;
        Ok(config)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    compress: bool,
    connect_timeout: Duration,
    io_timeout: Duration,
    line_limit: usize,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            compress: false,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            line_limit: DEFAULT_LINE_LIMIT,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Requests compression when the server supports it.
    #[must_use]
    pub const fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the line-length ceiling for split batched commands.
    #[must_use]
    pub const fn line_limit(mut self, limit: usize) -> Self {
        self.line_limit = limit;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let port = self.port.unwrap_or_else(|| self.security.default_port());
        Config {
            host: self.host,
            port,
            security: self.security,
            compress: self.compress,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            line_limit: self.line_limit,
        }
    }
}
