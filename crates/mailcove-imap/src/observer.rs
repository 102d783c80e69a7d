//! Engine event observer.
//!
//! Servers push information at any time: message counts, expunges, flag
//! changes, alerts, BYE. The engine forwards those through a single observer
//! passed at construction; a host wanting several subscribers composes them
//! behind one implementation.

use crate::parser::FetchItem;
use crate::types::{Flags, SeqNum, UidSet};

/// Receiver for server-initiated events.
///
/// All methods have no-op defaults; implement the ones you care about.
pub trait EngineObserver: Send {
    /// ALERT response code: text that must be shown to the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// The server is closing the connection (untagged BYE).
    fn on_bye(&mut self, text: &str) {
        let _ = text;
    }

    /// The engine has reached its terminal disconnected state.
    fn on_disconnected(&mut self) {}

    /// Message count changed (EXISTS).
    fn on_exists(&mut self, count: u32) {
        let _ = count;
    }

    /// Recent count changed (RECENT).
    fn on_recent(&mut self, count: u32) {
        let _ = count;
    }

    /// A message was removed (EXPUNGE).
    fn on_expunge(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// Messages vanished (QRESYNC VANISHED).
    fn on_vanished(&mut self, earlier: bool, uids: &UidSet) {
        let _ = (earlier, uids);
    }

    /// Message metadata changed (unsolicited FETCH).
    fn on_fetch(&mut self, seq: SeqNum, items: &[FetchItem]) {
        let _ = (seq, items);
    }

    /// The mailbox flag set changed (FLAGS).
    fn on_flags(&mut self, flags: &Flags) {
        let _ = flags;
    }

    /// Informational untagged OK text.
    fn on_info(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged NO (warning) text.
    fn on_warning(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged BAD (error) text.
    fn on_error(&mut self, text: &str) {
        let _ = text;
    }
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// An observer that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "server alert");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "server closing connection");
    }

    fn on_disconnected(&mut self) {
        tracing::info!("engine disconnected");
    }

    fn on_exists(&mut self, count: u32) {
        tracing::debug!(count, "message count changed");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "recent count changed");
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "message expunged");
    }

    fn on_vanished(&mut self, earlier: bool, uids: &UidSet) {
        tracing::debug!(earlier, %uids, "messages vanished");
    }

    fn on_fetch(&mut self, seq: SeqNum, items: &[FetchItem]) {
        tracing::debug!(seq = seq.get(), items = items.len(), "unsolicited fetch");
    }

    fn on_flags(&mut self, flags: &Flags) {
        tracing::debug!(count = flags.len(), "mailbox flags changed");
    }

    fn on_warning(&mut self, text: &str) {
        tracing::warn!(text, "server warning");
    }

    fn on_error(&mut self, text: &str) {
        tracing::error!(text, "server error");
    }
}
