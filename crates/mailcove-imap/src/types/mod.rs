//! Core IMAP types.
//!
//! This module defines the fundamental types used throughout the engine,
//! following RFC 3501 (`IMAP4rev1`) and the extensions the engine parses.

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod sequence;

pub use capability::{Capability, CapabilitySet, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{ModSeq, SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{ListResponse, Mailbox, MailboxAttribute, MailboxStatus};
pub use response_code::ResponseCode;
pub use sequence::{SequenceSet, UidSet, UidSetEntry, UidSetIter};
