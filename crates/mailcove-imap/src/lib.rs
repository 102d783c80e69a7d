//! # mailcove-imap
//!
//! An IMAP4rev1 (RFC 3501) client protocol engine: the component that turns
//! high-level operations into correctly framed command streams and consumes
//! the server's interleaved tagged and untagged responses into structured
//! results.
//!
//! ## What's inside
//!
//! - **Command builder**: printf-style templates (`%d %u %s %F %S %Q %L`)
//!   compiled into send parts split around literals, with LITERAL+/LITERAL-
//!   negotiation and a length estimator for line-limit splitting
//! - **Engine**: tag allocation, one-command-at-a-time pipeline, untagged
//!   handler tables, capability tracking with re-query, clean disconnect
//! - **Lexer and response parser** for the full response surface the engine
//!   understands: FETCH, LIST, STATUS, SEARCH/ESEARCH, SORT, THREAD,
//!   VANISHED, NAMESPACE, QUOTA, ID, ACL, METADATA, and the response codes
//! - **Search compiler**: typed query AST, idempotent optimiser, charset
//!   ladder with a single BADCHARSET retry
//! - **IDLE**: a scoped long-lived mode driven by done/cancel tokens with
//!   the read timeout lifted while idling
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcove_imap::{Config, Engine, Mailbox, NoopObserver, SearchOptions, SearchQuery};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mailcove_imap::Result<()> {
//!     let config = Config::builder("imap.example.com").build();
//!     let stream = mailcove_imap::engine::connect_tls(&config.host, config.port).await?;
//!
//!     let mut engine = Engine::new(stream, &config, Box::new(NoopObserver));
//!     engine.greet().await?;
//!     engine.login("user@example.com", "password").await?;
//!
//!     let status = engine.select(&Mailbox::inbox()).await?;
//!     println!("{} messages", status.exists);
//!
//!     let unseen = engine
//!         .search(&SearchQuery::Unseen, &SearchOptions::default())
//!         .await?;
//!     println!("unseen: {:?}", unseen.ids);
//!
//!     // Wait for new mail until the caller signals done
//!     let done = CancellationToken::new();
//!     engine.idle(done.clone(), CancellationToken::new()).await?;
//!
//!     engine.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Scope
//!
//! The engine consumes a pluggable duplex byte stream; DNS/TCP/TLS setup,
//! SASL mechanism internals, and MIME parsing live in the host. Message
//! literals stream from any `AsyncRead` whose encoded length is known up
//! front.
//!
//! ## Modules
//!
//! - [`command`]: command templates, literals, tags
//! - [`engine`]: the pipeline, transports, IDLE
//! - [`parser`]: lexer and response parser
//! - [`search`]: query AST, optimiser, SORT/THREAD emission
//! - [`types`]: flags, mailboxes, sequences, capabilities, response codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod engine;
mod error;
mod observer;
pub mod parser;
pub mod search;
pub mod types;

pub use command::{
    Arg, BuiltCommand, Command, CommandPart, CommandResponse, CommandStatus, ContinuationHandler,
    EncodeOptions, FetchAttribute, FetchItems, Literal, StatusAttribute, StoreAction, StoreOp,
    TagGenerator, build, estimate_length,
};
pub use engine::{
    Config, ConfigBuilder, Engine, EngineHandle, EngineState, FramedStream, ImapStream,
    QresyncParams, Security, SelectedFolder,
};
pub use error::{Error, Result};
pub use observer::{EngineObserver, NoopObserver, TracingObserver};
pub use parser::{
    Envelope, FetchItem, Response, ResponseParser, SearchResults, ThreadNode, UntaggedResponse,
};
pub use search::{
    SearchCharset, SearchOptions, SearchQuery, SearchReturn, SortCriterion, SortKey,
    ThreadAlgorithm,
};
pub use types::{
    Capability, CapabilitySet, Flag, Flags, ListResponse, Mailbox, MailboxAttribute,
    MailboxStatus, ModSeq, ResponseCode, SeqNum, SequenceSet, Status, Tag, Uid, UidSet,
    UidValidity,
};

/// IMAP protocol version implemented by this engine.
pub const IMAP_VERSION: &str = "IMAP4rev1";
