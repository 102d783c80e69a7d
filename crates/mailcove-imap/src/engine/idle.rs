//! IDLE: the long-lived unsolicited-response mode (RFC 2177).
//!
//! IDLE is a command the server only ends after the client writes `DONE`.
//! The scope is tied to two cancellation sources: a *done* token requesting
//! a normal end, and the command's cancellation token aborting the read and
//! rendering the connection unusable. While idling, the read timeout is
//! lifted; untagged traffic keeps flowing through the normal dispatch
//! pathway, so the observer sees every event.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::command::{Command, ContinuationHandler, build};
use crate::parser::{Response, ResponseParser};
use crate::types::{Capability, Tag};
use crate::{Error, Result};

use super::{Engine, EngineState};

impl<S> Engine<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Enters IDLE until `done` fires or `cancel` aborts.
    ///
    /// Preconditions: a mailbox is selected and the server advertises IDLE.
    /// On the done path the engine writes `DONE`, consumes the tagged
    /// completion, restores the read timeout, and is Selected again. On the
    /// cancel path the read is abandoned and the engine is Disconnected.
    pub async fn idle(&mut self, done: CancellationToken, cancel: CancellationToken) -> Result<()> {
        if self.state != EngineState::Selected {
            return Err(Error::InvalidState(
                "IDLE requires a selected mailbox".to_string(),
            ));
        }
        if !self.caps.is_set(&Capability::Idle) {
            return Err(Error::Unsupported("IDLE"));
        }
        if self.busy {
            return Err(Error::Busy);
        }

        self.busy = true;
        let result = self.idle_inner(&done, &cancel).await;
        self.busy = false;

        match &result {
            Err(e) if e.is_fatal() => self.force_disconnect(),
            _ => {
                if self.state == EngineState::Idle {
                    self.state = EngineState::Selected;
                }
            }
        }
        result
    }

    async fn idle_inner(
        &mut self,
        done: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let built = build("IDLE", vec![], self.encode_options())?;
        let mut cmd = Command::new("IDLE", built)
            .with_continuation(ContinuationHandler::Idle)
            .with_cancellation(cancel.clone());

        let tag = self.tags.next();
        cmd.tag = Some(Tag::new(&tag));
        cmd.status = crate::command::CommandStatus::Active;

        let mut line = Vec::with_capacity(tag.len() + 1 + cmd.parts[0].bytes.len());
        line.extend_from_slice(tag.as_bytes());
        line.push(b' ');
        line.extend_from_slice(&cmd.parts[0].bytes);
        self.stream.write_command(&line).await?;

        // The server either invites idling or rejects the command outright
        loop {
            match self.read_parsed(cancel).await? {
                Response::Continuation { .. } => break,
                Response::Untagged(untagged) => {
                    self.dispatch_untagged(&mut cmd, untagged)?;
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
                    self.complete(&mut cmd, status, codes, text)?;
                    return finish(self, cmd);
                }
            }
        }

        self.state = EngineState::Idle;
        let saved_timeout = self.stream.read_timeout();
        self.stream.set_read_timeout(None);

        let outcome = self.idle_loop(&mut cmd, done, cancel, saved_timeout).await;

        // Idempotent when the done path restored it already
        self.stream.set_read_timeout(saved_timeout);

        outcome?;
        finish(self, cmd)
    }

    async fn idle_loop(
        &mut self,
        cmd: &mut Command,
        done: &CancellationToken,
        cancel: &CancellationToken,
        saved_timeout: Option<Duration>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                // Abort beats done beats traffic
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled);
                }
                () = done.cancelled() => {
                    // A failed DONE write is swallowed; the socket surfaces
                    // real trouble through the completion read
                    if let Err(error) = self.stream.write_command(b"DONE\r\n").await {
                        tracing::debug!(%error, "ignoring DONE write failure");
                    }
                    self.stream.set_read_timeout(saved_timeout);
                    return self.await_idle_completion(cmd, cancel).await;
                }
                raw = self.stream.read_response() => {
                    let raw = raw?;
                    match ResponseParser::parse_in(&raw, self.utf8_enabled)? {
                        Response::Untagged(untagged) => {
                            self.dispatch_untagged(cmd, untagged)?;
                        }
                        Response::Tagged { tag: seen, status, codes, text } => {
                            // The server ended IDLE on its own
                            if Some(&seen) != cmd.tag.as_ref() {
                                return Err(Error::Protocol(format!(
                                    "tagged completion for unknown tag {seen}"
                                )));
                            }
                            return self.complete(cmd, status, codes, text);
                        }
                        Response::Continuation { .. } => {
                            return Err(Error::Protocol(
                                "unexpected continuation while idling".to_string(),
                            ));
                        }
                    }
                }
            }
        }
    }

    async fn await_idle_completion(
        &mut self,
        cmd: &mut Command,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            match self.read_parsed(cancel).await? {
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
                Response::Continuation { .. } => {
                    return Err(Error::Protocol(
                        "unexpected continuation after DONE".to_string(),
                    ));
                }
            }
        }
    }
}

/// Post-completion bookkeeping shared by every IDLE exit path.
fn finish<S>(engine: &mut Engine<S>, cmd: Command) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if engine.state == EngineState::Idle {
        engine.state = EngineState::Selected;
    }
    let bye = cmd.saw_bye();
    let result = cmd.into_result();
    if bye {
        engine.force_disconnect();
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio_test::io::Builder;

    use super::*;
    use crate::engine::Config;
    use crate::observer::EngineObserver;
    use crate::types::Mailbox;

    struct ExistsProbe(Arc<AtomicU32>);

    impl EngineObserver for ExistsProbe {
        fn on_exists(&mut self, count: u32) {
            self.0.store(count, Ordering::Relaxed);
        }
    }

    async fn selected_engine(
        mock: tokio_test::io::Mock,
        exists: Arc<AtomicU32>,
    ) -> Engine<tokio_test::io::Mock> {
        let config = Config::builder("test.example.com")
            .io_timeout(Duration::from_secs(5))
            .build();
        let mut engine = Engine::new(mock, &config, Box::new(ExistsProbe(exists)));
        engine.greet().await.unwrap();
        engine.select(&Mailbox::inbox()).await.unwrap();
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn idle_round_trip() {
        let exists = Arc::new(AtomicU32::new(0));
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 IDLE] hi\r\n")
            .write(b"A00000001 SELECT INBOX\r\n")
            .read(b"* 172 EXISTS\r\n")
            .read(b"A00000001 OK [READ-WRITE] done\r\n")
            .write(b"A00000002 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* 173 EXISTS\r\n")
            .write(b"DONE\r\n")
            .read(b"A00000002 OK IDLE terminated\r\n")
            .build();

        let mut engine = selected_engine(mock, Arc::clone(&exists)).await;

        let done = CancellationToken::new();
        let trigger = done.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        engine
            .idle(done, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(engine.state(), EngineState::Selected);
        // The EXISTS seen while idling reached the observer and the counters
        assert_eq!(exists.load(Ordering::Relaxed), 173);
        assert_eq!(engine.selected().unwrap().status.exists, 173);
        // The read timeout is back
        assert_eq!(
            engine.stream.read_timeout(),
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn idle_requires_selected_state() {
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 IDLE] hi\r\n")
            .build();
        let config = Config::builder("test.example.com").build();
        let mut engine = Engine::new(mock, &config, Box::new(crate::observer::NoopObserver));
        engine.greet().await.unwrap();

        let err = engine
            .idle(CancellationToken::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn idle_requires_capability() {
        let exists = Arc::new(AtomicU32::new(0));
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
            .write(b"A00000001 SELECT INBOX\r\n")
            .read(b"A00000001 OK done\r\n")
            .build();
        let mut engine = selected_engine(mock, exists).await;

        let err = engine
            .idle(CancellationToken::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported("IDLE")));
        assert_eq!(engine.state(), EngineState::Selected);
    }

    #[tokio::test]
    async fn idle_rejection_by_server_keeps_selected() {
        let exists = Arc::new(AtomicU32::new(0));
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 IDLE] hi\r\n")
            .write(b"A00000001 SELECT INBOX\r\n")
            .read(b"A00000001 OK done\r\n")
            .write(b"A00000002 IDLE\r\n")
            .read(b"A00000002 NO IDLE not allowed now\r\n")
            .build();
        let mut engine = selected_engine(mock, exists).await;

        let err = engine
            .idle(CancellationToken::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::No { .. }));
        assert_eq!(engine.state(), EngineState::Selected);
    }

    #[tokio::test]
    async fn idle_cancel_disconnects() {
        let exists = Arc::new(AtomicU32::new(0));
        let mock = Builder::new()
            .read(b"* PREAUTH [CAPABILITY IMAP4rev1 IDLE] hi\r\n")
            .write(b"A00000001 SELECT INBOX\r\n")
            .read(b"A00000001 OK done\r\n")
            .write(b"A00000002 IDLE\r\n")
            .read(b"+ idling\r\n")
            .build();
        let mut engine = selected_engine(mock, exists).await;

        // The abort token is already tripped when idling begins
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .idle(CancellationToken::new(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(engine.state(), EngineState::Disconnected);
    }
}
