//! IMAP command objects.
//!
//! A [`Command`] is a built byte sequence (its [`CommandPart`]s) plus the
//! engine-facing bookkeeping: tag, lifecycle status, completion result,
//! per-command untagged handlers, and an optional continuation handler.

mod builder;
mod items;
mod literal;
mod tag;

pub use builder::{
    Arg, BuiltCommand, CommandAccumulator, CommandPart, EncodeOptions, StringKind, build,
    classify, estimate_length, LITERAL_MINUS_LIMIT,
};
pub use items::{FetchAttribute, FetchItems, StatusAttribute, StoreAction, StoreOp};
pub use literal::Literal;
pub use tag::TagGenerator;

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::parser::UntaggedResponse;
use crate::types::{Mailbox, ResponseCode, Tag};
use crate::{Error, Result};

/// Lifecycle of a command inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandStatus {
    /// Built, not yet handed to the engine.
    #[default]
    Created,
    /// Accepted by the engine, waiting its turn.
    Queued,
    /// Being sent / awaiting its tagged completion.
    Active,
    /// Tagged completion consumed.
    Complete,
    /// Failed before completion (I/O, protocol, cancellation).
    Error,
}

/// The server's verdict on a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandResponse {
    /// No completion seen yet.
    #[default]
    None,
    /// OK.
    Ok,
    /// NO.
    No,
    /// BAD.
    Bad,
}

/// Handler invoked for untagged responses matched by atom while the command
/// is active.
pub type UntaggedHandler = Box<dyn FnMut(&UntaggedResponse) -> Result<()> + Send>;

/// Handler for `+` continuations that are not literal sends.
pub enum ContinuationHandler {
    /// SASL step: receives the challenge text, returns the response line
    /// (without CRLF).
    Sasl(Box<dyn FnMut(&str) -> Result<Vec<u8>> + Send>),
    /// IDLE: the engine switches to idle mode instead of writing a response.
    Idle,
}

impl std::fmt::Debug for ContinuationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sasl(_) => f.write_str("Sasl"),
            Self::Idle => f.write_str("Idle"),
        }
    }
}

/// Progress callback for literal uploads: (bytes written, total bytes).
pub type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;

/// A command moving through the engine pipeline.
pub struct Command {
    /// Command name for error reporting (`SELECT`, `UID FETCH`, ...).
    name: String,
    /// Destination folder, when the command targets one.
    folder: Option<Mailbox>,
    /// Built parts in send order.
    pub(crate) parts: Vec<CommandPart>,
    /// Tag assigned by the engine.
    pub(crate) tag: Option<Tag>,
    /// Lifecycle status.
    pub(crate) status: CommandStatus,
    /// Server verdict.
    pub(crate) response: CommandResponse,
    /// Result text from the tagged completion.
    pub(crate) response_text: String,
    /// Response codes seen on the completion line.
    pub(crate) resp_codes: Vec<ResponseCode>,
    /// An untagged BYE arrived while this command was active.
    pub(crate) bye: bool,
    /// This is a LOGOUT command; its failures are swallowed.
    pub(crate) logout: bool,
    /// Atom → handler, matched case-insensitively.
    pub(crate) untagged: HashMap<String, UntaggedHandler>,
    /// Continuation handler for non-literal `+` lines.
    pub(crate) continuation: Option<ContinuationHandler>,
    /// Cancellation handle.
    pub(crate) cancel: CancellationToken,
    /// Literal upload progress callback.
    pub(crate) progress: Option<ProgressFn>,
}

impl Command {
    /// Creates a command from built parts.
    #[must_use]
    pub fn new(name: impl Into<String>, built: BuiltCommand) -> Self {
        Self {
            name: name.into(),
            folder: None,
            parts: built.parts,
            tag: None,
            status: CommandStatus::Created,
            response: CommandResponse::None,
            response_text: String::new(),
            resp_codes: Vec::new(),
            bye: false,
            logout: false,
            untagged: HashMap::new(),
            continuation: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Returns the command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the destination folder.
    #[must_use]
    pub fn with_folder(mut self, folder: Mailbox) -> Self {
        self.folder = Some(folder);
        self
    }

    /// Returns the destination folder.
    #[must_use]
    pub fn folder(&self) -> Option<&Mailbox> {
        self.folder.as_ref()
    }

    /// Marks this command as LOGOUT (failures swallowed on disconnect).
    #[must_use]
    pub fn logout(mut self) -> Self {
        self.logout = true;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attaches a literal progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the continuation handler.
    #[must_use]
    pub fn with_continuation(mut self, handler: ContinuationHandler) -> Self {
        self.continuation = Some(handler);
        self
    }

    /// Registers an untagged handler for a response atom.
    ///
    /// Only legal while the command has not been handed to the engine.
    pub fn on_untagged(
        &mut self,
        atom: impl Into<String>,
        handler: UntaggedHandler,
    ) -> Result<()> {
        if self.status != CommandStatus::Created {
            return Err(Error::InvalidState(
                "untagged handlers may only be registered before queueing".to_string(),
            ));
        }
        self.untagged.insert(atom.into().to_uppercase(), handler);
        Ok(())
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> CommandStatus {
        self.status
    }

    /// Returns the server verdict.
    #[must_use]
    pub const fn response(&self) -> CommandResponse {
        self.response
    }

    /// Returns the result text of the tagged completion.
    #[must_use]
    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    /// Returns the response codes from the completion line.
    #[must_use]
    pub fn resp_codes(&self) -> &[ResponseCode] {
        &self.resp_codes
    }

    /// Returns the assigned tag, if the engine has taken the command.
    #[must_use]
    pub fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    /// True if an untagged BYE arrived while this command was active.
    #[must_use]
    pub const fn saw_bye(&self) -> bool {
        self.bye
    }

    /// Converts the completion into a `Result`, mapping NO/BAD to errors.
    pub fn into_result(self) -> Result<()> {
        match self.response {
            CommandResponse::Ok => Ok(()),
            CommandResponse::No => Err(Error::No {
                command: self.name,
                text: self.response_text,
                codes: self.resp_codes,
            }),
            CommandResponse::Bad => Err(Error::Bad {
                command: self.name,
                text: self.response_text,
            }),
            CommandResponse::None => Err(Error::Protocol(format!(
                "{} finished without a tagged completion",
                self.name
            ))),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("status", &self.status)
            .field("response", &self.response)
            .field("parts", &self.parts.len())
            .field("handlers", &self.untagged.len())
            .finish_non_exhaustive()
    }
}
