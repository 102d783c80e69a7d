//! End-to-end tests for the protocol engine.
//!
//! These drive the engine over a scripted mock stream: server responses are
//! served in order while every byte the engine writes is captured for
//! inspection.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;

use mailcove_imap::{
    Capability, Config, Engine, EngineState, Error, Literal, Mailbox, NoopObserver, SearchOptions,
    SearchQuery, UidSet,
};

/// Mock stream that serves scripted responses and captures sent bytes.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                responses: Cursor::new(responses.to_vec()),
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        #[allow(clippy::cast_possible_truncation)]
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn engine_over(script: &[u8]) -> (Engine<MockStream>, Arc<Mutex<Vec<u8>>>) {
    let (stream, sent) = MockStream::new(script);
    let config = Config::builder("test.example.com")
        .io_timeout(Duration::from_secs(30))
        .build();
    (Engine::new(stream, &config, Box::new(NoopObserver)), sent)
}

fn sent_string(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(
        &sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner),
    )
    .into_owned()
}

#[tokio::test]
async fn capability_then_login_with_inline_capability() {
    let script = b"* OK ready\r\n\
        * CAPABILITY IMAP4rev1 STARTTLS LITERAL+ SASL-IR\r\n\
        A00000001 OK Capability completed.\r\n\
        A00000002 OK [CAPABILITY IMAP4rev1 IDLE] LOGIN completed.\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.capability().await.unwrap();
    assert!(engine.capabilities().is_set(&Capability::LiteralPlus));
    assert!(engine.capabilities().is_set(&Capability::SaslIr));

    engine.login("joe", "secret").await.unwrap();
    assert_eq!(engine.state(), EngineState::Authenticated);
    assert!(engine.capabilities().is_set(&Capability::Idle));
    assert!(!engine.capabilities().is_set(&Capability::StartTls));

    // The login completion carried a CAPABILITY code, so there is no
    // separate re-query
    let sent = sent_string(&sent);
    assert_eq!(
        sent,
        "A00000001 CAPABILITY\r\nA00000002 LOGIN joe secret\r\n"
    );
}

#[tokio::test]
async fn select_reports_counters_uidvalidity_and_access() {
    let script = b"* PREAUTH hi\r\n\
        * 172 EXISTS\r\n\
        * OK [UIDVALIDITY 3857529045]\r\n\
        * OK [UIDNEXT 4392]\r\n\
        A00000001 OK [READ-WRITE] SELECT completed.\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    let status = engine.select(&Mailbox::inbox()).await.unwrap();

    assert_eq!(engine.state(), EngineState::Selected);
    assert_eq!(
        engine.selected().map(|s| s.mailbox.as_str()),
        Some("INBOX")
    );
    assert_eq!(status.exists, 172);
    assert_eq!(status.uid_validity.map(|v| v.get()), Some(3_857_529_045));
    assert_eq!(status.uid_next.map(|u| u.get()), Some(4392));
    assert!(!status.read_only);

    assert_eq!(sent_string(&sent), "A00000001 SELECT INBOX\r\n");
}

#[tokio::test]
async fn append_with_literal_plus_sends_inline() {
    let script = b"* PREAUTH [CAPABILITY IMAP4rev1 LITERAL+] hi\r\n\
        A00000001 OK [APPENDUID 3857529045 4392] APPEND completed\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    let granted = engine
        .append(
            &Mailbox::inbox(),
            None,
            Literal::from(b"HELLO".as_slice()),
        )
        .await
        .unwrap();

    let (uid_validity, uids) = granted.unwrap();
    assert_eq!(uid_validity.get(), 3_857_529_045);
    assert_eq!(uids.to_string(), "4392");

    // Non-synchronised literal: no continuation round trip, exactly the
    // declared five bytes between the prefix line and the closing CRLF
    assert_eq!(
        sent_string(&sent),
        "A00000001 APPEND INBOX {5+}\r\nHELLO\r\n"
    );
}

#[tokio::test]
async fn append_without_literal_plus_waits_for_continuation() {
    let script = b"* PREAUTH hi\r\n\
        + Ready for literal\r\n\
        A00000001 OK [APPENDUID 3857529045 4392] APPEND completed\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    let granted = engine
        .append(
            &Mailbox::inbox(),
            None,
            Literal::from(b"HELLO".as_slice()),
        )
        .await
        .unwrap();
    assert!(granted.is_some());

    assert_eq!(
        sent_string(&sent),
        "A00000001 APPEND INBOX {5}\r\nHELLO\r\n"
    );
}

#[tokio::test]
async fn append_rejected_at_continuation_point() {
    let script = b"* PREAUTH hi\r\n\
        A00000001 NO APPEND failed: quota exceeded\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    let err = engine
        .append(
            &Mailbox::inbox(),
            None,
            Literal::from(b"HELLO".as_slice()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::No { .. }));
    // The literal was never sent
    assert_eq!(sent_string(&sent), "A00000001 APPEND INBOX {5}\r\n");
}

#[tokio::test]
async fn search_retries_once_on_badcharset() {
    let script = b"* PREAUTH [CAPABILITY IMAP4rev1 LITERAL+] hi\r\n\
        A00000001 OK selected\r\n\
        A00000002 NO [BADCHARSET (US-ASCII)] UTF-8 not supported\r\n\
        * SEARCH 23\r\n\
        A00000003 OK SEARCH completed\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    let query = SearchQuery::Text(
        mailcove_imap::search::TextKind::Subject,
        "r\u{e9}sum\u{e9}".to_string(),
    );
    let options = SearchOptions {
        uid: true,
        ret: None,
    };
    let results = engine.search(&query, &options).await.unwrap();

    let ids: Vec<u32> = results.ids.unwrap().iter().map(|u| u.get()).collect();
    assert_eq!(ids, vec![23]);

    let sent = sent_string(&sent);
    // First attempt declares the charset; the retry drops it
    assert!(sent.contains("A00000002 UID SEARCH CHARSET UTF-8 SUBJECT {8+}\r\nr\u{e9}sum\u{e9}\r\n"));
    assert!(sent.contains("A00000003 UID SEARCH SUBJECT {8+}\r\nr\u{e9}sum\u{e9}\r\n"));
}

#[tokio::test]
async fn second_badcharset_is_surfaced() {
    let script = b"* PREAUTH [CAPABILITY IMAP4rev1 LITERAL+] hi\r\n\
        A00000001 OK selected\r\n\
        A00000002 NO [BADCHARSET (US-ASCII)] UTF-8 not supported\r\n\
        A00000003 NO [BADCHARSET (US-ASCII)] still not supported\r\n";
    let (mut engine, _sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    let query = SearchQuery::Text(
        mailcove_imap::search::TextKind::Subject,
        "r\u{e9}sum\u{e9}".to_string(),
    );
    let err = engine
        .search(&query, &SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::No { .. }));
}

#[tokio::test]
async fn ascii_search_has_no_charset_or_literal() {
    let script = b"* PREAUTH hi\r\n\
        A00000001 OK selected\r\n\
        * SEARCH 2 84 882\r\n\
        A00000002 OK SEARCH completed\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    let query = SearchQuery::Unseen.and(SearchQuery::Text(
        mailcove_imap::search::TextKind::From,
        "smith".to_string(),
    ));
    let results = engine
        .search(&query, &SearchOptions::default())
        .await
        .unwrap();

    let ids: Vec<u32> = results.ids.unwrap().iter().map(|u| u.get()).collect();
    assert_eq!(ids, vec![2, 84, 882]);

    let sent = sent_string(&sent);
    assert!(sent.contains("A00000002 SEARCH UNSEEN FROM smith\r\n"));
    assert!(!sent.contains("CHARSET"));
    assert!(!sent.contains('{'));
}

#[tokio::test]
async fn esearch_response_populates_results() {
    let script = b"* PREAUTH [CAPABILITY IMAP4rev1 ESEARCH] hi\r\n\
        A00000001 OK selected\r\n\
        * ESEARCH (TAG \"A00000002\") UID MIN 2 MAX 47 COUNT 17 ALL 2:9,12\r\n\
        A00000002 OK SEARCH completed\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    let options = SearchOptions {
        uid: true,
        ret: Some(vec![
            mailcove_imap::SearchReturn::Min,
            mailcove_imap::SearchReturn::Max,
            mailcove_imap::SearchReturn::Count,
            mailcove_imap::SearchReturn::All,
        ]),
    };
    let results = engine.search(&SearchQuery::All, &options).await.unwrap();

    assert_eq!(results.min, Some(2));
    assert_eq!(results.max, Some(47));
    assert_eq!(results.count, Some(17));
    assert_eq!(results.ids.unwrap().count(), 9);

    assert!(
        sent_string(&sent)
            .contains("A00000002 UID SEARCH RETURN (MIN MAX COUNT ALL) ALL\r\n")
    );
}

#[tokio::test]
async fn bye_mid_command_completes_then_disconnects() {
    let script = b"* PREAUTH hi\r\n\
        * BYE Server shutting down\r\n\
        A00000001 NO shutting down\r\n";
    let (mut engine, _sent) = engine_over(script);

    engine.greet().await.unwrap();

    let err = engine.noop().await.unwrap_err();
    assert!(matches!(err, Error::No { .. }));
    assert_eq!(engine.state(), EngineState::Disconnected);

    // Everything afterwards fails without touching the wire
    assert!(matches!(
        engine.noop().await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        engine.select(&Mailbox::inbox()).await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn tags_are_unique_and_monotonic() {
    let script = b"* PREAUTH hi\r\n\
        A00000001 OK done\r\n\
        A00000002 OK done\r\n\
        A00000003 OK done\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.noop().await.unwrap();
    engine.noop().await.unwrap();
    engine.noop().await.unwrap();

    assert_eq!(
        sent_string(&sent),
        "A00000001 NOOP\r\nA00000002 NOOP\r\nA00000003 NOOP\r\n"
    );
}

#[tokio::test]
async fn store_surfaces_modified_set() {
    let script = b"* PREAUTH [CAPABILITY IMAP4rev1 CONDSTORE] hi\r\n\
        A00000001 OK selected\r\n\
        * 1 FETCH (FLAGS (\\Seen) MODSEQ (320162342))\r\n\
        A00000002 OK [MODIFIED 7,9] Conditional STORE failed for some\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    use mailcove_imap::{Flag, ModSeq, SequenceSet, StoreAction};
    let action = StoreAction::add(vec![Flag::Seen])
        .unchanged_since(ModSeq::from_u64(320_162_338).unwrap());
    let (echoes, modified) = engine
        .store(&SequenceSet::range(1, 9).unwrap(), &action, false)
        .await
        .unwrap();

    assert_eq!(echoes.len(), 1);
    assert_eq!(modified, UidSet::parse("7,9"));

    assert!(sent_string(&sent).contains(
        "A00000002 STORE 1:9 (UNCHANGEDSINCE 320162338) +FLAGS (\\Seen)\r\n"
    ));
}

#[tokio::test]
async fn expunge_collects_sequence_numbers() {
    let script = b"* PREAUTH hi\r\n\
        A00000001 OK selected\r\n\
        * 3 EXPUNGE\r\n\
        * 3 EXPUNGE\r\n\
        * 5 EXPUNGE\r\n\
        A00000002 OK EXPUNGE completed\r\n";
    let (mut engine, _sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    let expunged = engine.expunge().await.unwrap();
    let seqs: Vec<u32> = expunged.iter().map(|s| s.get()).collect();
    assert_eq!(seqs, vec![3, 3, 5]);
}

#[tokio::test]
async fn vanished_and_qresync_select() {
    let script = b"* OK [CAPABILITY IMAP4rev1 ENABLE CONDSTORE QRESYNC] hi\r\n\
        A00000001 OK logged in\r\n\
        * CAPABILITY IMAP4rev1 ENABLE CONDSTORE QRESYNC\r\n\
        A00000002 OK done\r\n\
        * ENABLED QRESYNC\r\n\
        A00000003 OK enabled\r\n\
        * 10 EXISTS\r\n\
        * VANISHED (EARLIER) 41,43:45\r\n\
        * OK [UIDVALIDITY 3857529045]\r\n\
        * OK [HIGHESTMODSEQ 715194045007]\r\n\
        A00000004 OK [READ-WRITE] SELECT completed\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.login("joe", "secret").await.unwrap();
    engine.enable_qresync().await.unwrap();
    assert!(engine.qresync_enabled());

    use mailcove_imap::{ModSeq, QresyncParams, UidValidity};
    let params = QresyncParams {
        uid_validity: UidValidity::new(3_857_529_045).unwrap(),
        highest_mod_seq: ModSeq::from_u64(715_194_044_000).unwrap(),
        known_uids: UidSet::parse("41:45"),
    };
    let status = engine
        .select_qresync(&Mailbox::inbox(), params)
        .await
        .unwrap();

    assert_eq!(status.exists, 10);
    assert_eq!(
        status.highest_mod_seq.map(|m| m.get()),
        Some(715_194_045_007)
    );

    assert!(sent_string(&sent).contains(
        "A00000004 SELECT INBOX (QRESYNC (3857529045 715194044000 41:45))\r\n"
    ));
}

#[tokio::test]
async fn idle_round_trip_with_scripted_server() {
    use tokio_test::io::Builder;

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

    let config = Config::builder("test.example.com")
        .io_timeout(Duration::from_secs(30))
        .build();
    let mut engine = Engine::new(mock, &config, Box::new(NoopObserver));
    engine.greet().await.unwrap();
    engine.select(&Mailbox::inbox()).await.unwrap();

    let done = CancellationToken::new();
    let trigger = done.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    engine
        .idle(done, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(engine.state(), EngineState::Selected);
    assert_eq!(engine.selected().unwrap().status.exists, 173);
}

#[tokio::test]
async fn disconnect_swallows_logout_failure() {
    // The server hangs up without answering LOGOUT
    let script = b"* PREAUTH hi\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine.disconnect().await;

    assert_eq!(engine.state(), EngineState::Disconnected);
    assert_eq!(sent_string(&sent), "A00000001 LOGOUT\r\n");
}

#[tokio::test]
async fn non_ascii_mailbox_uses_modified_utf7() {
    let script = b"* PREAUTH hi\r\n\
        A00000001 OK [READ-WRITE] selected\r\n";
    let (mut engine, sent) = engine_over(script);

    engine.greet().await.unwrap();
    engine
        .select(&Mailbox::new("Entw\u{fc}rfe"))
        .await
        .unwrap();

    assert_eq!(sent_string(&sent), "A00000001 SELECT Entw&APw-rfe\r\n");
}
