//! IMAP wire-syntax parsing.
//!
//! The [`lexer`] breaks raw bytes into IMAP tokens; [`response`] builds
//! structured responses out of them. Both are pure: all I/O lives in the
//! engine.

pub mod lexer;
pub mod response;

pub use response::{
    Address, Annotation, BodyStructure, Envelope, FetchItem, NamespaceEntry, Namespaces,
    QuotaResource, Response, ResponseParser, SearchResults, StatusItem, ThreadNode,
    UntaggedResponse,
};
