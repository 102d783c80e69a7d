//! The command pipeline.
//!
//! [`Engine`] owns the transport exclusively and runs exactly one command at
//! a time: it allocates the tag, writes the command's parts (pausing for `+`
//! continuations before synchronising literals), and dispatches every
//! response line — untagged data to the command's handler table or the
//! engine's default parser, continuations to the command's continuation
//! handler, and the matching tagged line to command completion.
//!
//! Callers serialise through [`EngineHandle`], which wraps the engine in an
//! explicit mutex; a second command attempt on a busy engine fails fast with
//! [`Error::Busy`] rather than blocking.

#![allow(clippy::missing_errors_doc)]

mod config;
mod framed;
mod idle;
mod state;
mod stream;

pub use config::{Config, ConfigBuilder, DEFAULT_LINE_LIMIT, Security};
pub use framed::FramedStream;
pub use state::EngineState;
pub use stream::{ImapStream, connect_plain, connect_tls, create_tls_connector};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::command::{
    Arg, Command, CommandResponse, CommandStatus, ContinuationHandler, EncodeOptions, FetchItems,
    Literal, StatusAttribute, StoreAction, TagGenerator, build,
};
use crate::observer::EngineObserver;
use crate::parser::{
    FetchItem, Response, ResponseParser, SearchResults, StatusItem, ThreadNode, UntaggedResponse,
};
use crate::search::{
    SearchCharset, SearchOptions, SearchQuery, SortKey, ThreadAlgorithm, compile_search,
    compile_sort, compile_thread,
};
use crate::types::{
    Capability, CapabilitySet, Flags, ListResponse, Mailbox, MailboxStatus, ModSeq, ResponseCode,
    SeqNum, SequenceSet, Status, Tag, Uid, UidSet, UidValidity,
};
use crate::{Error, Result};

/// QRESYNC parameters for SELECT (RFC 7162).
#[derive(Debug, Clone)]
pub struct QresyncParams {
    /// The UIDVALIDITY captured last session.
    pub uid_validity: UidValidity,
    /// The HIGHESTMODSEQ captured last session.
    pub highest_mod_seq: ModSeq,
    /// Known UIDs, enabling VANISHED (EARLIER) responses.
    pub known_uids: Option<UidSet>,
}

/// The currently selected folder and its live state.
#[derive(Debug, Clone)]
pub struct SelectedFolder {
    /// The folder name.
    pub mailbox: Mailbox,
    /// Counters and metadata, updated by untagged responses.
    pub status: MailboxStatus,
}

/// The IMAP protocol engine.
pub struct Engine<S> {
    stream: FramedStream<S>,
    tags: TagGenerator,
    state: EngineState,
    caps: CapabilitySet,
    qresync_enabled: bool,
    utf8_enabled: bool,
    selected: Option<SelectedFolder>,
    /// Encoded-name → last known status, fed by STATUS and SELECT.
    folders: HashMap<String, MailboxStatus>,
    /// Charsets the server has declared supported (BADCHARSET lists).
    known_charsets: Vec<String>,
    observer: Box<dyn EngineObserver>,
    busy: bool,
    /// The capability set changed through the command currently in flight.
    cap_update_from_current: bool,
    line_limit: usize,
}

impl<S> Engine<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates an engine over a connected transport.
    ///
    /// The engine starts in `Disconnected` until [`Engine::greet`] consumes
    /// the server greeting.
    pub fn new(stream: S, config: &Config, observer: Box<dyn EngineObserver>) -> Self {
        let mut framed = FramedStream::new(stream);
        framed.set_read_timeout(Some(config.io_timeout));
        framed.set_write_timeout(Some(config.io_timeout));
        Self {
            stream: framed,
            tags: TagGenerator::default(),
            state: EngineState::Disconnected,
            caps: CapabilitySet::new(),
            qresync_enabled: false,
            utf8_enabled: false,
            selected: None,
            folders: HashMap::new(),
            known_charsets: Vec::new(),
            observer,
            busy: false,
            cap_update_from_current: false,
            line_limit: config.line_limit,
        }
    }

    // === Accessors ===

    /// Returns the current connection state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Returns the advertised capability set.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    /// Masks off a capability (workaround hook for broken servers).
    pub fn disable_capability(&mut self, cap: &Capability) {
        self.caps.disable(cap);
    }

    /// Returns true while a command is in flight.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy
    }

    /// Returns the selected folder, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<&SelectedFolder> {
        self.selected.as_ref()
    }

    /// Returns the cached status of a folder by name.
    #[must_use]
    pub fn folder_status(&self, mailbox: &Mailbox) -> Option<&MailboxStatus> {
        self.folders.get(&mailbox.encode_utf7())
    }

    /// Returns true once QRESYNC has been enabled for this session.
    #[must_use]
    pub const fn qresync_enabled(&self) -> bool {
        self.qresync_enabled
    }

    /// Returns true once UTF8=ACCEPT has been enabled for this session.
    #[must_use]
    pub const fn utf8_enabled(&self) -> bool {
        self.utf8_enabled
    }

    /// Returns the line-length ceiling for split batched commands.
    #[must_use]
    pub const fn line_limit(&self) -> usize {
        self.line_limit
    }

    /// Encode options derived from the negotiated capabilities.
    #[must_use]
    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            utf8_accept: self.utf8_enabled,
            literal_plus: self.caps.is_set(&Capability::LiteralPlus),
            literal_minus: self.caps.is_set(&Capability::LiteralMinus),
        }
    }

    /// Swaps the transport (STARTTLS or compression insertion).
    ///
    /// Consumes the engine and rebuilds it over the new transport; all
    /// session state carries over. No byte may be in flight.
    pub async fn upgrade<T, F, Fut>(self, f: F) -> Result<Engine<T>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let read_timeout = self.stream.read_timeout();
        let write_timeout = self.stream.write_timeout();
        let transport = self.stream.into_inner();
        let transport = f(transport).await?;
        let mut framed = FramedStream::new(transport);
        framed.set_read_timeout(read_timeout);
        framed.set_write_timeout(write_timeout);
        Ok(Engine {
            stream: framed,
            tags: self.tags,
            state: self.state,
            caps: self.caps,
            qresync_enabled: self.qresync_enabled,
            utf8_enabled: self.utf8_enabled,
            selected: self.selected,
            folders: self.folders,
            known_charsets: self.known_charsets,
            observer: self.observer,
            busy: false,
            cap_update_from_current: false,
            line_limit: self.line_limit,
        })
    }

    /// Advances the tag prefix for a replayed session.
    ///
    /// Hosts that re-establish the connection and carry the session state
    /// over (via [`Engine::upgrade`] onto the fresh transport) call this
    /// before issuing the first command, so a stale response from the old
    /// connection can never match a new tag. The counter keeps counting;
    /// only the prefix changes.
    pub fn advance_tag_prefix(&mut self) {
        self.tags.advance_prefix();
    }

    // === Greeting ===

    /// Consumes the server greeting and establishes the initial state.
    pub async fn greet(&mut self) -> Result<()> {
        if self.state != EngineState::Disconnected {
            return Err(Error::InvalidState("greeting already consumed".to_string()));
        }

        let raw = self.stream.read_response().await?;
        match ResponseParser::parse_in(&raw, self.utf8_enabled)? {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => {
                if let Some(code) = code {
                    self.absorb_code(&code, "");
                }
                self.state = EngineState::Connected;
                Ok(())
            }
            Response::Untagged(UntaggedResponse::PreAuth { code, .. }) => {
                if let Some(code) = code {
                    self.absorb_code(&code, "");
                }
                self.state = EngineState::Authenticated;
                Ok(())
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => Err(Error::Bye(text)),
            other => Err(Error::Protocol(format!(
                "unexpected greeting: {other:?}"
            ))),
        }
    }

    // === Command execution ===

    /// Runs a command through the pipeline.
    ///
    /// Exactly one command may be active; a concurrent attempt fails with
    /// [`Error::Busy`]. Fatal errors (I/O, protocol, cancellation) force the
    /// engine to `Disconnected`; NO/BAD completions leave it usable.
    pub async fn exec(&mut self, cmd: &mut Command) -> Result<()> {
        if self.state == EngineState::Idle {
            return Err(Error::InvalidState(
                "engine is idling; end IDLE first".to_string(),
            ));
        }
        if !self.state.is_connected() {
            return Err(Error::InvalidState("engine is disconnected".to_string()));
        }
        if self.busy {
            return Err(Error::Busy);
        }

        self.busy = true;
        self.cap_update_from_current = false;
        let result = self.exec_inner(cmd).await;
        self.busy = false;

        match &result {
            Err(e) if e.is_fatal() => {
                cmd.status = CommandStatus::Error;
                self.force_disconnect();
                // Best-effort LOGOUT: the teardown already happened, the
                // failure carries no information
                if cmd.logout {
                    tracing::debug!(error = %e, "ignoring LOGOUT failure during teardown");
                    return Ok(());
                }
            }
            _ => {
                // An unsolicited BYE lets the current command finish, then
                // the engine goes terminal
                if cmd.bye {
                    self.force_disconnect();
                }
            }
        }

        result
    }

    async fn exec_inner(&mut self, cmd: &mut Command) -> Result<()> {
        let tag = self.tags.next();
        cmd.tag = Some(Tag::new(&tag));
        cmd.status = CommandStatus::Active;
        let cancel = cmd.cancel.clone();

        for index in 0..cmd.parts.len() {
            // A cancelled write leaves a partial command on the wire
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let bytes = if index == 0 {
                let mut first = Vec::with_capacity(tag.len() + 1 + cmd.parts[0].bytes.len());
                first.extend_from_slice(tag.as_bytes());
                first.push(b' ');
                first.extend_from_slice(&cmd.parts[0].bytes);
                first
            } else {
                cmd.parts[index].bytes.clone()
            };
            self.stream.write_command(&bytes).await?;

            let wait = cmd.parts[index].wait_for_continuation;
            let Some(literal) = cmd.parts[index].literal.take() else {
                continue;
            };

            if wait {
                // Synchronising literal: the server must invite it
                loop {
                    match self.read_parsed(&cancel).await? {
                        Response::Continuation { .. } => break,
                        Response::Untagged(untagged) => {
                            self.dispatch_untagged(cmd, untagged)?;
                        }
                        Response::Tagged {
                            tag: seen,
                            status,
                            codes,
                            text,
                        } => {
                            // The server refused the literal (e.g. NO before
                            // the continuation)
                            if Some(&seen) != cmd.tag.as_ref() {
                                return Err(Error::Protocol(format!(
                                    "unexpected tag {seen} while awaiting continuation"
                                )));
                            }
                            return self.complete(cmd, status, codes, text);
                        }
                    }
                }
            }

            self.write_literal(cmd, literal, &cancel).await?;
        }

        // Await the tagged completion
        loop {
            match self.read_parsed(&cancel).await? {
                Response::Continuation { text } => match cmd.continuation.as_mut() {
                    Some(ContinuationHandler::Sasl(step)) => {
                        let line = step(text.as_deref().unwrap_or(""))?;
                        let mut out = line;
                        out.extend_from_slice(b"\r\n");
                        self.stream.write_command(&out).await?;
                    }
                    Some(ContinuationHandler::Idle) | None => {
                        return Err(Error::Protocol(
                            "unexpected continuation request".to_string(),
                        ));
                    }
                },
                Response::Untagged(untagged) => {
                    self.dispatch_untagged(cmd, untagged)?;
                }
                Response::Tagged {
                    tag: seen,
                    status,
                    codes,
                    text,
                } => {
                    if Some(&seen) != cmd.tag.as_ref() {
                        return Err(Error::Protocol(format!(
                            "tagged completion for unknown tag {seen}"
                        )));
                    }
                    return self.complete(cmd, status, codes, text);
                }
            }
        }
    }

    async fn read_parsed(&mut self, cancel: &CancellationToken) -> Result<Response> {
        let raw = tokio::select! {
            // Drain data that already arrived before honouring cancellation
            biased;
            raw = self.stream.read_response() => raw?,
            () = cancel.cancelled() => return Err(Error::Cancelled),
        };
        ResponseParser::parse_in(&raw, self.utf8_enabled)
    }

    async fn write_literal(
        &mut self,
        cmd: &mut Command,
        literal: Literal,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let total = literal.len();
        match literal {
            Literal::Bytes(data) => {
                self.stream.write_raw(&data).await?;
            }
            Literal::Stream { len, mut reader } => {
                let copied = self.stream.write_stream(&mut reader).await?;
                if copied != len {
                    return Err(Error::Protocol(format!(
                        "literal produced {copied} bytes, declared {len}"
                    )));
                }
            }
        }
        self.stream.flush().await?;

        if let Some(progress) = cmd.progress.as_mut() {
            progress(total, total);
        }
        Ok(())
    }

    /// Finalises a command from its tagged completion line.
    fn complete(
        &mut self,
        cmd: &mut Command,
        status: Status,
        codes: Vec<ResponseCode>,
        text: String,
    ) -> Result<()> {
        cmd.response = match status {
            Status::Ok => CommandResponse::Ok,
            Status::No => CommandResponse::No,
            Status::Bad => CommandResponse::Bad,
            Status::PreAuth | Status::Bye => {
                return Err(Error::Protocol(format!(
                    "invalid tagged completion status: {status:?}"
                )));
            }
        };

        for code in &codes {
            self.absorb_code(code, &text);
        }

        cmd.response_text = text;
        cmd.resp_codes = codes;
        cmd.status = CommandStatus::Complete;
        Ok(())
    }

    /// Routes one untagged response.
    ///
    /// Engine-critical bookkeeping (BYE, CAPABILITY, ENABLED, folder
    /// counters) always runs; the command's registered handler, when present,
    /// then consumes the response instead of the default parser.
    fn dispatch_untagged(&mut self, cmd: &mut Command, resp: UntaggedResponse) -> Result<()> {
        match &resp {
            UntaggedResponse::Bye { text, .. } => {
                cmd.bye = true;
                self.observer.on_bye(text);
            }
            UntaggedResponse::Capability(caps) => {
                self.caps.replace(caps.clone());
                self.cap_update_from_current = true;
            }
            UntaggedResponse::Enabled(caps) => {
                for cap in caps {
                    match cap {
                        Capability::Utf8Accept => self.utf8_enabled = true,
                        Capability::QResync => self.qresync_enabled = true,
                        _ => {}
                    }
                }
            }
            UntaggedResponse::Exists(n) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.exists = *n;
                }
            }
            UntaggedResponse::Recent(n) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.recent = *n;
                }
            }
            UntaggedResponse::Expunge(_) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.exists = selected.status.exists.saturating_sub(1);
                }
            }
            UntaggedResponse::Flags(flags) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.flags = flags.clone();
                }
            }
            UntaggedResponse::Status { mailbox, items } => {
                let entry = self.folders.entry(mailbox.encode_utf7()).or_default();
                for item in items {
                    match item {
                        StatusItem::Messages(n) => entry.exists = *n,
                        StatusItem::Recent(n) => entry.recent = *n,
                        StatusItem::UidNext(uid) => entry.uid_next = Some(*uid),
                        StatusItem::UidValidity(v) => entry.uid_validity = Some(*v),
                        StatusItem::Unseen(n) => entry.unseen = SeqNum::new(*n),
                        StatusItem::HighestModSeq(m) => entry.highest_mod_seq = Some(*m),
                    }
                }
            }
            _ => {}
        }

        if let Some(handler) = cmd.untagged.get_mut(resp.key()) {
            return handler(&resp);
        }

        self.default_untagged(&resp);
        Ok(())
    }

    /// Default processing for responses no handler claimed.
    fn default_untagged(&mut self, resp: &UntaggedResponse) {
        match resp {
            UntaggedResponse::Ok { code, text } => {
                if matches!(code, Some(ResponseCode::Alert)) {
                    self.observer.on_alert(text);
                } else {
                    if let Some(code) = code {
                        self.absorb_code(code, text);
                    }
                    self.observer.on_info(text);
                }
            }
            UntaggedResponse::No { text, .. } => self.observer.on_warning(text),
            UntaggedResponse::Bad { text, .. } => self.observer.on_error(text),
            UntaggedResponse::Exists(n) => self.observer.on_exists(*n),
            UntaggedResponse::Recent(n) => self.observer.on_recent(*n),
            UntaggedResponse::Expunge(seq) => self.observer.on_expunge(*seq),
            UntaggedResponse::Vanished { earlier, uids } => {
                self.observer.on_vanished(*earlier, uids);
            }
            UntaggedResponse::Fetch { seq, items } => self.observer.on_fetch(*seq, items),
            UntaggedResponse::Flags(flags) => self.observer.on_flags(flags),
            other => {
                tracing::debug!(key = other.key(), "unclaimed untagged response");
            }
        }
    }

    /// Absorbs a response code into engine state.
    fn absorb_code(&mut self, code: &ResponseCode, text: &str) {
        match code {
            ResponseCode::Capability(caps) => {
                self.caps.replace(caps.clone());
                self.cap_update_from_current = true;
            }
            ResponseCode::Alert => self.observer.on_alert(text),
            ResponseCode::BadCharset(charsets) => {
                for charset in charsets {
                    if !self
                        .known_charsets
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(charset))
                    {
                        self.known_charsets.push(charset.clone());
                    }
                }
            }
            ResponseCode::PermanentFlags(flags) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.permanent_flags = Flags::from_vec(flags.clone());
                }
            }
            ResponseCode::ReadOnly => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.read_only = true;
                }
            }
            ResponseCode::ReadWrite => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.read_only = false;
                }
            }
            ResponseCode::UidNext(uid) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.uid_next = Some(*uid);
                }
            }
            ResponseCode::UidValidity(validity) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.uid_validity = Some(*validity);
                }
            }
            ResponseCode::Unseen(seq) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.unseen = Some(*seq);
                }
            }
            ResponseCode::HighestModSeq(mod_seq) => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.highest_mod_seq = Some(*mod_seq);
                }
            }
            ResponseCode::NoModSeq => {
                if let Some(selected) = self.selected.as_mut() {
                    selected.status.no_mod_seq = true;
                }
            }
            _ => {}
        }
    }

    /// Tears the engine down to its terminal state.
    fn force_disconnect(&mut self) {
        if self.state != EngineState::Disconnected {
            self.state = EngineState::Disconnected;
            self.selected = None;
            self.observer.on_disconnected();
        }
    }

    /// Re-queries CAPABILITY unless the in-flight command already refreshed
    /// it.
    ///
    /// The version comparison alone would be fooled by an unrelated untagged
    /// CAPABILITY arriving between the call and its completion, so the engine
    /// also tracks whether the update originated from the same command.
    async fn requery_capabilities_if_needed(&mut self, prior_version: u64) -> Result<()> {
        if self.caps.version() != prior_version && self.cap_update_from_current {
            return Ok(());
        }
        self.capability().await
    }

    // === Any-state commands ===

    /// Issues CAPABILITY and records the advertised set.
    pub async fn capability(&mut self) -> Result<()> {
        let built = build("CAPABILITY", vec![], self.encode_options())?;
        let mut cmd = Command::new("CAPABILITY", built);
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Issues NOOP (keepalive; also flushes pending untagged updates).
    pub async fn noop(&mut self) -> Result<()> {
        let built = build("NOOP", vec![], self.encode_options())?;
        let mut cmd = Command::new("NOOP", built);
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Clean disconnect: best-effort LOGOUT whose failure is swallowed, then
    /// terminal state.
    pub async fn disconnect(&mut self) {
        if self.state.is_connected() && self.state != EngineState::Idle {
            let logout = async {
                let built = build("LOGOUT", vec![], self.encode_options())?;
                let mut cmd = Command::new("LOGOUT", built).logout();
                self.exec(&mut cmd).await?;
                cmd.into_result()
            };
            if let Err(error) = logout.await {
                tracing::debug!(%error, "ignoring LOGOUT failure during disconnect");
            }
        }
        self.force_disconnect();
    }

    // === Not-authenticated commands ===

    /// Issues STARTTLS.
    ///
    /// On OK the caller must swap the transport via [`Engine::upgrade`] and
    /// then call [`Engine::refresh_capabilities`]: everything learned before
    /// the handshake is untrusted.
    pub async fn starttls(&mut self) -> Result<()> {
        if self.state != EngineState::Connected {
            return Err(Error::InvalidState(
                "STARTTLS requires an unauthenticated connection".to_string(),
            ));
        }
        if !self.caps.is_set(&Capability::StartTls) {
            return Err(Error::Unsupported("STARTTLS"));
        }
        let built = build("STARTTLS", vec![], self.encode_options())?;
        let mut cmd = Command::new("STARTTLS", built);
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Issues COMPRESS DEFLATE.
    ///
    /// On OK the caller inserts the deflate layer via [`Engine::upgrade`].
    pub async fn compress(&mut self) -> Result<()> {
        if !self.caps.is_set(&Capability::CompressDeflate) {
            return Err(Error::Unsupported("COMPRESS=DEFLATE"));
        }
        let built = build("COMPRESS DEFLATE", vec![], self.encode_options())?;
        let mut cmd = Command::new("COMPRESS", built);
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Discards pre-upgrade capabilities and re-queries, honouring the
    /// same-command rule.
    pub async fn refresh_capabilities(&mut self) -> Result<()> {
        let prior = self.caps.version();
        self.cap_update_from_current = false;
        self.requery_capabilities_if_needed(prior).await
    }

    /// Authenticates with LOGIN.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.state != EngineState::Connected {
            return Err(Error::InvalidState(
                "LOGIN requires an unauthenticated connection".to_string(),
            ));
        }
        if self.caps.is_set(&Capability::LoginDisabled) {
            return Err(Error::Unsupported("LOGIN"));
        }

        let built = build(
            "LOGIN %S %S",
            vec![Arg::String(Some(username)), Arg::String(Some(password))],
            self.encode_options(),
        )?;
        let mut cmd = Command::new("LOGIN", built);

        let prior = self.caps.version();
        self.exec(&mut cmd).await?;

        match cmd.response {
            CommandResponse::Ok => {
                self.state = EngineState::Authenticated;
                self.requery_capabilities_if_needed(prior).await
            }
            _ => Err(auth_error(&cmd)),
        }
    }

    /// Authenticates with a SASL mechanism.
    ///
    /// `initial` is the mechanism's initial response, sent inline when the
    /// server advertises SASL-IR; `step` answers subsequent challenges with
    /// raw response bytes (base64 framing is the engine's job).
    pub async fn authenticate(
        &mut self,
        mechanism: &str,
        initial: Option<Vec<u8>>,
        mut step: Box<dyn FnMut(&[u8]) -> Result<Vec<u8>> + Send>,
    ) -> Result<()> {
        if self.state != EngineState::Connected {
            return Err(Error::InvalidState(
                "AUTHENTICATE requires an unauthenticated connection".to_string(),
            ));
        }

        let sasl_ir = self.caps.is_set(&Capability::SaslIr);
        let (built, mut pending_initial) = if sasl_ir && initial.is_some() {
            let encoded = initial
                .as_deref()
                .map(|ir| {
                    if ir.is_empty() {
                        "=".to_string()
                    } else {
                        BASE64.encode(ir)
                    }
                })
                .unwrap_or_default();
            (
                build(
                    "AUTHENTICATE %s %s",
                    vec![Arg::Raw(mechanism), Arg::Raw(&encoded)],
                    self.encode_options(),
                )?,
                None,
            )
        } else {
            (
                build(
                    "AUTHENTICATE %s",
                    vec![Arg::Raw(mechanism)],
                    self.encode_options(),
                )?,
                initial,
            )
        };

        let mut cmd = Command::new("AUTHENTICATE", built).with_continuation(
            ContinuationHandler::Sasl(Box::new(move |challenge: &str| {
                // Without SASL-IR the first (often empty) challenge asks for
                // the initial response
                let response = if let Some(ir) = pending_initial.take() {
                    ir
                } else {
                    let decoded = BASE64.decode(challenge.trim()).map_err(|_| {
                        Error::Protocol("SASL challenge is not valid base64".to_string())
                    })?;
                    step(&decoded)?
                };
                Ok(if response.is_empty() {
                    Vec::new()
                } else {
                    BASE64.encode(&response).into_bytes()
                })
            })),
        );

        let prior = self.caps.version();
        self.exec(&mut cmd).await?;

        match cmd.response {
            CommandResponse::Ok => {
                self.state = EngineState::Authenticated;
                self.requery_capabilities_if_needed(prior).await
            }
            _ => Err(auth_error(&cmd)),
        }
    }

    // === Authenticated commands ===

    /// Enables QRESYNC (RFC 7162). Legal only before any SELECT.
    pub async fn enable_qresync(&mut self) -> Result<()> {
        self.enable(Capability::QResync, "QRESYNC").await
    }

    /// Enables UTF8=ACCEPT (RFC 6855). Legal only before any SELECT.
    pub async fn enable_utf8(&mut self) -> Result<()> {
        self.enable(Capability::Utf8Accept, "UTF8=ACCEPT").await
    }

    async fn enable(&mut self, cap: Capability, wire: &'static str) -> Result<()> {
        if self.state != EngineState::Authenticated {
            return Err(Error::InvalidState(
                "ENABLE is legal only after authentication and before SELECT".to_string(),
            ));
        }
        if !self.caps.is_set(&cap) || !self.caps.is_set(&Capability::Enable) {
            return Err(Error::Unsupported(wire));
        }

        let built = build("ENABLE %s", vec![Arg::Raw(wire)], self.encode_options())?;
        let mut cmd = Command::new("ENABLE", built);
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Selects a mailbox read-write.
    pub async fn select(&mut self, mailbox: &Mailbox) -> Result<MailboxStatus> {
        self.do_select("SELECT", mailbox, None).await
    }

    /// Selects a mailbox read-only.
    pub async fn examine(&mut self, mailbox: &Mailbox) -> Result<MailboxStatus> {
        self.do_select("EXAMINE", mailbox, None).await
    }

    /// Selects with QRESYNC resynchronisation parameters.
    pub async fn select_qresync(
        &mut self,
        mailbox: &Mailbox,
        params: QresyncParams,
    ) -> Result<MailboxStatus> {
        if !self.qresync_enabled {
            return Err(Error::Unsupported("QRESYNC"));
        }
        self.do_select("SELECT", mailbox, Some(params)).await
    }

    async fn do_select(
        &mut self,
        verb: &str,
        mailbox: &Mailbox,
        qresync: Option<QresyncParams>,
    ) -> Result<MailboxStatus> {
        if !self.state.is_authenticated() {
            return Err(Error::InvalidState(format!(
                "{verb} requires an authenticated session"
            )));
        }

        let enc = self.encode_options();
        let built = if let Some(params) = qresync {
            let mut resync = format!(
                "{} {}",
                params.uid_validity.get(),
                params.highest_mod_seq.get()
            );
            if let Some(known) = &params.known_uids {
                resync.push(' ');
                resync.push_str(&known.to_string());
            }
            let template = format!("{verb} %F (QRESYNC (%s))");
            build(&template, vec![Arg::Folder(mailbox), Arg::Raw(&resync)], enc)?
        } else if self.caps.is_set(&Capability::CondStore) {
            let template = format!("{verb} %F (CONDSTORE)");
            build(&template, vec![Arg::Folder(mailbox)], enc)?
        } else {
            let template = format!("{verb} %F");
            build(&template, vec![Arg::Folder(mailbox)], enc)?
        };

        // Counters and codes accumulate here as responses arrive
        self.selected = Some(SelectedFolder {
            mailbox: mailbox.clone(),
            status: MailboxStatus::default(),
        });
        if verb == "EXAMINE" {
            if let Some(selected) = self.selected.as_mut() {
                selected.status.read_only = true;
            }
        }

        let mut cmd = Command::new(verb, built).with_folder(mailbox.clone());
        let run = self.exec(&mut cmd).await;

        match run.and(cmd.into_result()) {
            Ok(()) => {
                self.state = EngineState::Selected;
                let status = self
                    .selected
                    .as_ref()
                    .map(|s| s.status.clone())
                    .unwrap_or_default();
                self.folders.insert(mailbox.encode_utf7(), status.clone());
                Ok(status)
            }
            Err(err) => {
                // A failed SELECT leaves no mailbox selected
                self.selected = None;
                if self.state.is_connected() {
                    self.state = EngineState::Authenticated;
                }
                Err(err)
            }
        }
    }

    /// Closes the selected mailbox, expunging deleted messages.
    pub async fn close(&mut self) -> Result<()> {
        self.do_unselect("CLOSE").await
    }

    /// Unselects without expunging (requires UNSELECT... widely supported;
    /// falls back to CLOSE semantics on the server side).
    pub async fn unselect(&mut self) -> Result<()> {
        self.do_unselect("UNSELECT").await
    }

    async fn do_unselect(&mut self, verb: &str) -> Result<()> {
        if self.state != EngineState::Selected {
            return Err(Error::InvalidState(format!(
                "{verb} requires a selected mailbox"
            )));
        }
        let built = build(verb, vec![], self.encode_options())?;
        let mut cmd = Command::new(verb, built);
        self.exec(&mut cmd).await?;
        cmd.into_result()?;
        self.selected = None;
        self.state = EngineState::Authenticated;
        Ok(())
    }

    /// Lists folders matching a pattern.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        self.do_list("LIST", reference, pattern).await
    }

    /// Lists subscribed folders matching a pattern.
    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListResponse>> {
        self.do_list("LSUB", reference, pattern).await
    }

    async fn do_list(
        &mut self,
        verb: &'static str,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<ListResponse>> {
        if !self.state.is_authenticated() {
            return Err(Error::InvalidState(format!(
                "{verb} requires an authenticated session"
            )));
        }

        let built = build(
            &format!("{verb} %Q %Q"),
            vec![Arg::Quoted(reference), Arg::Quoted(pattern)],
            self.encode_options(),
        )?;
        let mut cmd = Command::new(verb, built);

        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        cmd.on_untagged(
            verb,
            Box::new(move |resp| {
                if let UntaggedResponse::List(list) | UntaggedResponse::Lsub(list) = resp {
                    lock(&sink).push(list.clone());
                }
                Ok(())
            }),
        )?;

        self.exec(&mut cmd).await?;
        cmd.into_result()?;
        Ok(std::mem::take(&mut *lock(&results)))
    }

    /// Queries folder status without selecting it.
    pub async fn status(
        &mut self,
        mailbox: &Mailbox,
        attributes: &[StatusAttribute],
    ) -> Result<MailboxStatus> {
        if !self.state.is_authenticated() {
            return Err(Error::InvalidState(
                "STATUS requires an authenticated session".to_string(),
            ));
        }

        let attrs = attributes
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let built = build(
            "STATUS %F (%s)",
            vec![Arg::Folder(mailbox), Arg::Raw(&attrs)],
            self.encode_options(),
        )?;
        let mut cmd = Command::new("STATUS", built).with_folder(mailbox.clone());
        self.exec(&mut cmd).await?;
        cmd.into_result()?;

        Ok(self
            .folders
            .get(&mailbox.encode_utf7())
            .cloned()
            .unwrap_or_default())
    }

    /// Creates a mailbox.
    pub async fn create(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.mailbox_op("CREATE", mailbox).await
    }

    /// Deletes a mailbox.
    pub async fn delete(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.mailbox_op("DELETE", mailbox).await
    }

    /// Subscribes to a mailbox.
    pub async fn subscribe(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.mailbox_op("SUBSCRIBE", mailbox).await
    }

    /// Unsubscribes from a mailbox.
    pub async fn unsubscribe(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.mailbox_op("UNSUBSCRIBE", mailbox).await
    }

    async fn mailbox_op(&mut self, verb: &'static str, mailbox: &Mailbox) -> Result<()> {
        if !self.state.is_authenticated() {
            return Err(Error::InvalidState(format!(
                "{verb} requires an authenticated session"
            )));
        }
        let built = build(
            &format!("{verb} %F"),
            vec![Arg::Folder(mailbox)],
            self.encode_options(),
        )?;
        let mut cmd = Command::new(verb, built).with_folder(mailbox.clone());
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Renames a mailbox.
    pub async fn rename(&mut self, from: &Mailbox, to: &Mailbox) -> Result<()> {
        if !self.state.is_authenticated() {
            return Err(Error::InvalidState(
                "RENAME requires an authenticated session".to_string(),
            ));
        }
        let built = build(
            "RENAME %F %F",
            vec![Arg::Folder(from), Arg::Folder(to)],
            self.encode_options(),
        )?;
        let mut cmd = Command::new("RENAME", built);
        self.exec(&mut cmd).await?;
        cmd.into_result()
    }

    /// Appends a message; returns the APPENDUID payload when the server
    /// grants one (UIDPLUS).
    pub async fn append(
        &mut self,
        mailbox: &Mailbox,
        flags: Option<&Flags>,
        message: Literal,
    ) -> Result<Option<(UidValidity, UidSet)>> {
        if !self.state.is_authenticated() {
            return Err(Error::InvalidState(
                "APPEND requires an authenticated session".to_string(),
            ));
        }

        let enc = self.encode_options();
        let built = match flags {
            Some(flags) if !flags.is_empty() => {
                let list = flags
                    .iter()
                    .map(crate::types::Flag::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                build(
                    "APPEND %F (%s) %L",
                    vec![
                        Arg::Folder(mailbox),
                        Arg::Raw(&list),
                        Arg::Literal(message),
                    ],
                    enc,
                )?
            }
            _ => build(
                "APPEND %F %L",
                vec![Arg::Folder(mailbox), Arg::Literal(message)],
                enc,
            )?,
        };

        let mut cmd = Command::new("APPEND", built).with_folder(mailbox.clone());
        self.exec(&mut cmd).await?;

        let append_uid = cmd.resp_codes().iter().find_map(|code| {
            if let ResponseCode::AppendUid { uid_validity, uids } = code {
                Some((*uid_validity, uids.clone()))
            } else {
                None
            }
        });
        cmd.into_result()?;
        Ok(append_uid)
    }

    /// Identifies client and server (RFC 2971).
    pub async fn id(
        &mut self,
        parameters: Option<&[(String, String)]>,
    ) -> Result<Option<Vec<(String, Option<String>)>>> {
        if !self.caps.is_set(&Capability::Id) {
            return Err(Error::Unsupported("ID"));
        }

        let enc = self.encode_options();
        let built = match parameters {
            Some(params) => {
                let mut acc = crate::command::CommandAccumulator::new(enc);
                acc.raw(b"ID (");
                for (i, (field, value)) in params.iter().enumerate() {
                    if i > 0 {
                        acc.raw(b" ");
                    }
                    acc.quoted(field);
                    acc.raw(b" ");
                    acc.quoted(value);
                }
                acc.raw(b")");
                acc.finish()
            }
            None => build("ID NIL", vec![], enc)?,
        };

        let mut cmd = Command::new("ID", built);
        let server_id = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&server_id);
        cmd.on_untagged(
            "ID",
            Box::new(move |resp| {
                if let UntaggedResponse::Id(fields) = resp {
                    *lock(&sink) = fields.clone();
                }
                Ok(())
            }),
        )?;

        self.exec(&mut cmd).await?;
        cmd.into_result()?;
        Ok(lock(&server_id).take())
    }

    // === Selected-state commands ===

    fn require_selected(&self, verb: &str) -> Result<()> {
        if self.state == EngineState::Selected {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{verb} requires a selected mailbox"
            )))
        }
    }

    /// Fetches message data.
    pub async fn fetch(
        &mut self,
        set: &SequenceSet,
        items: &FetchItems,
        uid: bool,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        self.require_selected("FETCH")?;

        let name = if uid { "UID FETCH" } else { "FETCH" };
        let built = build(
            &format!("{name} %s %s"),
            vec![Arg::Raw(&set.to_string()), Arg::Raw(&items.to_string())],
            self.encode_options(),
        )?;
        let mut cmd = Command::new(name, built);

        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        cmd.on_untagged(
            "FETCH",
            Box::new(move |resp| {
                if let UntaggedResponse::Fetch { seq, items } = resp {
                    lock(&sink).push((*seq, items.clone()));
                }
                Ok(())
            }),
        )?;

        self.exec(&mut cmd).await?;
        cmd.into_result()?;
        Ok(std::mem::take(&mut *lock(&results)))
    }

    /// Stores flags; returns the untagged FETCH echoes and any MODIFIED set
    /// (CONDSTORE).
    pub async fn store(
        &mut self,
        set: &SequenceSet,
        action: &StoreAction,
        uid: bool,
    ) -> Result<(Vec<(SeqNum, Vec<FetchItem>)>, Option<UidSet>)> {
        self.require_selected("STORE")?;
        if action.unchanged_since.is_some() && !self.caps.is_set(&Capability::CondStore) {
            return Err(Error::Unsupported("CONDSTORE"));
        }

        let name = if uid { "UID STORE" } else { "STORE" };
        let built = build(
            &format!("{name} %s %s"),
            vec![Arg::Raw(&set.to_string()), Arg::Raw(&action.to_string())],
            self.encode_options(),
        )?;
        let mut cmd = Command::new(name, built);

        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        cmd.on_untagged(
            "FETCH",
            Box::new(move |resp| {
                if let UntaggedResponse::Fetch { seq, items } = resp {
                    lock(&sink).push((*seq, items.clone()));
                }
                Ok(())
            }),
        )?;

        self.exec(&mut cmd).await?;

        let modified = cmd.resp_codes().iter().find_map(|code| {
            if let ResponseCode::Modified(uids) = code {
                Some(uids.clone())
            } else {
                None
            }
        });
        cmd.into_result()?;
        Ok((std::mem::take(&mut *lock(&results)), modified))
    }

    /// Copies messages; returns the COPYUID payload when granted (UIDPLUS).
    pub async fn copy(
        &mut self,
        set: &SequenceSet,
        mailbox: &Mailbox,
        uid: bool,
    ) -> Result<Option<(UidValidity, UidSet, UidSet)>> {
        self.transfer("COPY", set, mailbox, uid).await
    }

    /// Moves messages (RFC 6851); returns the COPYUID payload when granted.
    pub async fn move_messages(
        &mut self,
        set: &SequenceSet,
        mailbox: &Mailbox,
        uid: bool,
    ) -> Result<Option<(UidValidity, UidSet, UidSet)>> {
        if !self.caps.is_set(&Capability::Move) {
            return Err(Error::Unsupported("MOVE"));
        }
        self.transfer("MOVE", set, mailbox, uid).await
    }

    async fn transfer(
        &mut self,
        verb: &str,
        set: &SequenceSet,
        mailbox: &Mailbox,
        uid: bool,
    ) -> Result<Option<(UidValidity, UidSet, UidSet)>> {
        self.require_selected(verb)?;

        let name = if uid {
            format!("UID {verb}")
        } else {
            verb.to_string()
        };
        let built = build(
            &format!("{name} %s %F"),
            vec![Arg::Raw(&set.to_string()), Arg::Folder(mailbox)],
            self.encode_options(),
        )?;
        let mut cmd = Command::new(name, built).with_folder(mailbox.clone());
        self.exec(&mut cmd).await?;

        let copy_uid = cmd.resp_codes().iter().find_map(|code| {
            if let ResponseCode::CopyUid {
                uid_validity,
                source,
                dest,
            } = code
            {
                Some((*uid_validity, source.clone(), dest.clone()))
            } else {
                None
            }
        });
        cmd.into_result()?;
        Ok(copy_uid)
    }

    /// Expunges deleted messages; returns the expunged sequence numbers.
    pub async fn expunge(&mut self) -> Result<Vec<SeqNum>> {
        self.require_selected("EXPUNGE")?;

        let built = build("EXPUNGE", vec![], self.encode_options())?;
        let mut cmd = Command::new("EXPUNGE", built);

        let expunged = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&expunged);
        cmd.on_untagged(
            "EXPUNGE",
            Box::new(move |resp| {
                if let UntaggedResponse::Expunge(seq) = resp {
                    lock(&sink).push(*seq);
                }
                Ok(())
            }),
        )?;

        self.exec(&mut cmd).await?;
        cmd.into_result()?;
        Ok(std::mem::take(&mut *lock(&expunged)))
    }

    /// Expunges only the given UIDs (UIDPLUS).
    pub async fn uid_expunge(&mut self, uids: &UidSet) -> Result<Vec<SeqNum>> {
        self.require_selected("UID EXPUNGE")?;
        if !self.caps.is_set(&Capability::UidPlus) {
            return Err(Error::Unsupported("UIDPLUS"));
        }

        let built = build(
            "UID EXPUNGE %s",
            vec![Arg::Raw(&uids.to_string())],
            self.encode_options(),
        )?;
        let mut cmd = Command::new("UID EXPUNGE", built);

        let expunged = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&expunged);
        cmd.on_untagged(
            "EXPUNGE",
            Box::new(move |resp| {
                if let UntaggedResponse::Expunge(seq) = resp {
                    lock(&sink).push(*seq);
                }
                Ok(())
            }),
        )?;

        self.exec(&mut cmd).await?;
        cmd.into_result()?;
        Ok(std::mem::take(&mut *lock(&expunged)))
    }

    /// Searches the selected mailbox.
    ///
    /// Compiles the query through the charset ladder and retries exactly once
    /// on a BADCHARSET whose supported set excludes the attempted charset.
    pub async fn search(
        &mut self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResults> {
        self.require_selected("SEARCH")?;
        query.check_capabilities(&self.caps)?;
        if options.ret.is_some() && !self.caps.is_set(&Capability::ESearch) {
            return Err(Error::Unsupported("ESEARCH"));
        }

        let enc = self.encode_options();
        let mut charset = SearchCharset::initial(query, enc);
        let mut retried = false;

        loop {
            let built = compile_search(query, options, enc, charset)?;
            let name = if options.uid { "UID SEARCH" } else { "SEARCH" };
            let mut cmd = Command::new(name, built);
            let results = Self::install_search_handlers(&mut cmd)?;

            self.exec(&mut cmd).await?;
            match cmd.into_result() {
                Ok(()) => {
                    let mut out = std::mem::take(&mut *lock(&results));
                    out.uid |= options.uid;
                    return Ok(out);
                }
                Err(err) => {
                    if !retried
                        && charset == SearchCharset::Utf8
                        && should_retry_badcharset(&err)
                    {
                        if let Some(next) = charset.next() {
                            tracing::debug!("retrying search after BADCHARSET");
                            charset = next;
                            retried = true;
                            continue;
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Server-side sort (RFC 5256); returns identifiers in sorted order.
    pub async fn sort(
        &mut self,
        keys: &[SortKey],
        query: &SearchQuery,
        uid: bool,
    ) -> Result<Vec<u32>> {
        self.require_selected("SORT")?;
        if !self.caps.is_set(&Capability::Sort) {
            return Err(Error::Unsupported("SORT"));
        }
        if keys.iter().any(|k| k.criterion.needs_display())
            && !self.caps.is_set(&Capability::SortDisplay)
        {
            return Err(Error::Unsupported("SORT=DISPLAY"));
        }
        query.check_capabilities(&self.caps)?;

        let enc = self.encode_options();
        let mut charset = SearchCharset::initial(query, enc);
        let mut retried = false;

        loop {
            let built = compile_sort(keys, query, uid, enc, charset)?;
            let name = if uid { "UID SORT" } else { "SORT" };
            let mut cmd = Command::new(name, built);

            let results = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&results);
            cmd.on_untagged(
                "SORT",
                Box::new(move |resp| {
                    if let UntaggedResponse::Sort(ids) = resp {
                        lock(&sink).extend_from_slice(ids);
                    }
                    Ok(())
                }),
            )?;
            let sink = Arc::clone(&results);
            cmd.on_untagged(
                "ESEARCH",
                Box::new(move |resp| {
                    if let UntaggedResponse::ESearch(found) = resp {
                        if let Some(ids) = &found.ids {
                            lock(&sink).extend(ids.iter().map(Uid::get));
                        }
                    }
                    Ok(())
                }),
            )?;

            self.exec(&mut cmd).await?;
            match cmd.into_result() {
                Ok(()) => return Ok(std::mem::take(&mut *lock(&results))),
                Err(err) => {
                    if !retried
                        && charset == SearchCharset::Utf8
                        && should_retry_badcharset(&err)
                    {
                        if let Some(next) = charset.next() {
                            charset = next;
                            retried = true;
                            continue;
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Server-side threading (RFC 5256).
    pub async fn thread(
        &mut self,
        algorithm: ThreadAlgorithm,
        query: &SearchQuery,
        uid: bool,
    ) -> Result<Vec<ThreadNode>> {
        self.require_selected("THREAD")?;
        if !self.caps.supports_thread(algorithm.as_str()) {
            return Err(Error::Unsupported("THREAD"));
        }
        query.check_capabilities(&self.caps)?;

        let enc = self.encode_options();
        let mut charset = SearchCharset::initial(query, enc);
        let mut retried = false;

        loop {
            let built = compile_thread(algorithm, query, uid, enc, charset)?;
            let name = if uid { "UID THREAD" } else { "THREAD" };
            let mut cmd = Command::new(name, built);

            let results = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&results);
            cmd.on_untagged(
                "THREAD",
                Box::new(move |resp| {
                    if let UntaggedResponse::Thread(roots) = resp {
                        lock(&sink).extend_from_slice(roots);
                    }
                    Ok(())
                }),
            )?;

            self.exec(&mut cmd).await?;
            match cmd.into_result() {
                Ok(()) => return Ok(std::mem::take(&mut *lock(&results))),
                Err(err) => {
                    if !retried
                        && charset == SearchCharset::Utf8
                        && should_retry_badcharset(&err)
                    {
                        if let Some(next) = charset.next() {
                            charset = next;
                            retried = true;
                            continue;
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Registers the SEARCH and ESEARCH handlers every search-style command
    /// needs: some servers answer ESEARCH syntax with a plain SEARCH line.
    fn install_search_handlers(cmd: &mut Command) -> Result<Arc<Mutex<SearchResults>>> {
        let results = Arc::new(Mutex::new(SearchResults::default()));

        let sink = Arc::clone(&results);
        cmd.on_untagged(
            "SEARCH",
            Box::new(move |resp| {
                if let UntaggedResponse::Search { ids, mod_seq } = resp {
                    let mut guard = lock(&sink);
                    guard.ids = Some(ids.iter().copied().filter_map(Uid::new).collect());
                    guard.mod_seq = (*mod_seq).or(guard.mod_seq);
                }
                Ok(())
            }),
        )?;

        let sink = Arc::clone(&results);
        cmd.on_untagged(
            "ESEARCH",
            Box::new(move |resp| {
                if let UntaggedResponse::ESearch(found) = resp {
                    lock(&sink).merge(found.clone());
                }
                Ok(())
            }),
        )?;

        Ok(results)
    }
}

/// Locks a handler sink, surviving poisoning.
fn lock<T>(mutex: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// True when a command failed with BADCHARSET and the server's supported set
/// does not include UTF-8.
fn should_retry_badcharset(err: &Error) -> bool {
    err.bad_charset().is_some_and(|supported| {
        !supported.iter().any(|c| c.eq_ignore_ascii_case("UTF-8"))
    })
}

/// Maps an authentication failure to [`Error::Auth`], pulling the reason from
/// any `AUTHENTICATIONFAILED`-family response code.
fn auth_error(cmd: &Command) -> Error {
    let reason = cmd.resp_codes().iter().find_map(|code| {
        if let ResponseCode::AuthFailure(reason) = code {
            Some(reason.clone())
        } else {
            None
        }
    });
    Error::Auth {
        text: cmd.response_text().to_string(),
        reason,
    }
}

/// A shareable handle that serialises access to the engine.
///
/// The engine itself is not a synchronisation token: this handle owns the
/// mutex, and batch operations hold the guard across several commands.
pub struct EngineHandle<S> {
    inner: Arc<tokio::sync::Mutex<Engine<S>>>,
}

impl<S> Clone for EngineHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> EngineHandle<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an engine.
    #[must_use]
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(engine)),
        }
    }

    /// Acquires the engine, waiting for the current holder.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Engine<S>> {
        self.inner.lock().await
    }

    /// Acquires the engine or fails fast with [`Error::Busy`].
    pub fn try_lock(&self) -> Result<tokio::sync::MutexGuard<'_, Engine<S>>> {
        self.inner.try_lock().map_err(|_| Error::Busy)
    }
}

impl<S> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("busy", &self.busy)
            .field("capabilities_version", &self.caps.version())
            .field("qresync_enabled", &self.qresync_enabled)
            .field("utf8_enabled", &self.utf8_enabled)
            .field(
                "selected",
                &self.selected.as_ref().map(|s| s.mailbox.as_str()),
            )
            .finish_non_exhaustive()
    }
}
