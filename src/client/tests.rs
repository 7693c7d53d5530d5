//! Unit tests for the stream client connection task.
//!
//! Connections run over `tokio::io::duplex` pairs handed out by a local
//! connector, so each test plays the server by reading and writing the far
//! end directly. Timeout tests run with paused time and rely on Tokio's
//! auto-advance.

use std::time::Duration;

use futures::future::{self, BoxFuture};
use rstest::{fixture, rstest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::mpsc,
};
use tracing_test::traced_test;

use super::*;
use crate::codec::{Codec, Decoded};

/// Eight byte frames: big-endian sequence id then big-endian value.
struct Fixed;

impl Codec for Fixed {
    type Request = u32;
    type Response = u32;

    fn encode(&self, request: &u32, seq: u32) -> std::result::Result<Vec<u8>, crate::BoxError> {
        if *request == u32::MAX {
            return Err("value out of range".into());
        }
        let mut frame = seq.to_be_bytes().to_vec();
        frame.extend_from_slice(&request.to_be_bytes());
        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> std::result::Result<Decoded<u32>, crate::BoxError> {
        let (seq, value) = frame.split_at_checked(4).ok_or("short frame")?;
        Ok(Decoded::new(
            u32::from_be_bytes(seq.try_into()?),
            u32::from_be_bytes(value.try_into()?),
        ))
    }
}

impl FrameCodec for Fixed {
    fn frame_length(&self, buf: &[u8]) -> usize { if buf.len() >= 8 { 8 } else { 0 } }
}

/// Hands the far end of every new duplex pair to the test.
struct DuplexConnector {
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, std::io::Result<DuplexStream>> {
        let (client, server) = tokio::io::duplex(1024);
        let _ = self.accepted.send(server);
        Box::pin(future::ready(Ok(client)))
    }
}

/// Never finishes connecting.
struct StalledConnector;

impl Connector for StalledConnector {
    type Stream = DuplexStream;

    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, std::io::Result<DuplexStream>> {
        Box::pin(future::pending())
    }
}

/// Refuses every connection attempt.
struct RefusingConnector;

impl Connector for RefusingConnector {
    type Stream = DuplexStream;

    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, std::io::Result<DuplexStream>> {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        Box::pin(future::ready(Err(refused)))
    }
}

struct Harness {
    client: EasySock<Fixed>,
    accepted: mpsc::UnboundedReceiver<DuplexStream>,
}

impl Harness {
    fn new(config: ClientConfig) -> Self {
        let (tx, accepted) = mpsc::unbounded_channel();
        let connector = DuplexConnector { accepted: tx };
        let client = EasySock::with_connector(config, Fixed, connector).expect("valid config");
        Self { client, accepted }
    }

    async fn accept(&mut self) -> DuplexStream { self.accepted.recv().await.expect("connection attempt") }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
fn config() -> ClientConfig { ClientConfig::new("127.0.0.1", 3000) }

async fn read_request(server: &mut DuplexStream) -> (u32, u32) {
    let mut frame = [0u8; 8];
    server.read_exact(&mut frame).await.expect("read request");
    let (seq, value) = frame.split_at(4);
    (
        u32::from_be_bytes(seq.try_into().expect("seq bytes")),
        u32::from_be_bytes(value.try_into().expect("value bytes")),
    )
}

async fn reply(server: &mut DuplexStream, seq: u32, value: u32) {
    let mut frame = seq.to_be_bytes().to_vec();
    frame.extend_from_slice(&value.to_be_bytes());
    server.write_all(&frame).await.expect("write reply");
}

async fn wait_for_state(client: &EasySock<Fixed>, state: ConnectionState) {
    client
        .watch_status()
        .wait_for(|status| status.state == state)
        .await
        .expect("connection task running");
}

#[rstest]
#[tokio::test]
async fn writes_before_connect_are_replayed_in_order(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let replies: Vec<_> = (10..13).map(|value| harness.client.write(value)).collect();

    let mut server = harness.accept().await;
    for (expected_seq, expected_value) in (1..).zip(10..13) {
        let (seq, value) = read_request(&mut server).await;
        assert_eq!((seq, value), (expected_seq, expected_value));
        reply(&mut server, seq, value + 1).await;
    }

    for (reply, expected) in replies.into_iter().zip(11..14) {
        assert_eq!(reply.await.expect("response"), expected);
    }
}

#[rstest]
#[tokio::test]
async fn responses_are_matched_by_sequence_id(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let first = harness.client.write(100);
    let second = harness.client.write(200);

    let mut server = harness.accept().await;
    let a = read_request(&mut server).await;
    let b = read_request(&mut server).await;
    reply(&mut server, b.0, b.1 * 2).await;
    reply(&mut server, a.0, a.1 * 2).await;

    assert_eq!(second.await.expect("second response"), 400);
    assert_eq!(first.await.expect("first response"), 200);
}

#[rstest]
#[tokio::test]
async fn frames_split_across_reads_are_reassembled(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let response = harness.client.write(7);

    let mut server = harness.accept().await;
    let (seq, _) = read_request(&mut server).await;
    let mut frame = seq.to_be_bytes().to_vec();
    frame.extend_from_slice(&70u32.to_be_bytes());
    let (head, tail) = frame.split_at(3);
    server.write_all(head).await.expect("write head");
    tokio::task::yield_now().await;
    server.write_all(tail).await.expect("write tail");

    assert_eq!(response.await.expect("response"), 70);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_connection_survives(config: ClientConfig) {
    let mut harness = Harness::new(config.timeout(Duration::from_millis(100)));
    let mut events = harness.client.subscribe();
    let lost = harness.client.write(1);

    let mut server = harness.accept().await;
    let (lost_seq, _) = read_request(&mut server).await;
    let err = lost.await.expect_err("request should time out");
    assert_eq!(err.to_string(), "request timeout(100ms)");

    let mut saw_timeout = false;
    while let Ok(event) = events.try_recv() {
        if let ConnectionEvent::WriteTimeout { seq } = event {
            assert_eq!(seq, lost_seq);
            saw_timeout = true;
        }
    }
    assert!(saw_timeout, "expected a write timeout event");

    let next = harness.client.write(2);
    let (seq, value) = read_request(&mut server).await;
    reply(&mut server, seq, value).await;
    assert_eq!(next.await.expect("response after timeout"), 2);
    assert_eq!(harness.client.state(), ConnectionState::Alive);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn late_response_after_timeout_is_reported(config: ClientConfig) {
    let mut harness = Harness::new(config.timeout(Duration::from_millis(50)));
    let mut events = harness.client.subscribe();
    let lost = harness.client.write(1);

    let mut server = harness.accept().await;
    let (seq, _) = read_request(&mut server).await;
    assert!(lost.await.is_err());
    reply(&mut server, seq, 1).await;

    loop {
        if let ConnectionEvent::Error(EasySockError::UnknownSequence(unknown)) =
            events.recv().await.expect("event stream open")
        {
            assert_eq!(unknown, seq);
            break;
        }
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_connect_fails_every_queued_write() {
    let config = ClientConfig::new("10.255.255.1", 3000).timeout(Duration::from_millis(100));
    let client = EasySock::with_connector(config, Fixed, StalledConnector).expect("valid config");
    let mut events = client.subscribe();

    let first = client.write(1);
    let second = client.write(2);
    for pending in [first, second] {
        let err = pending.await.expect_err("connect should time out");
        assert_eq!(err.to_string(), "easy_sock:TCP connect timeout(300ms)");
    }

    assert!(matches!(events.recv().await, Ok(ConnectionEvent::ConnectTimeout)));
    match events.recv().await {
        Ok(ConnectionEvent::Closed { reason }) => {
            assert_eq!(reason, "easy_sock:TCP connect timeout(300ms)");
        }
        other => panic!("expected close event, got {other:?}"),
    }
    wait_for_state(&client, ConnectionState::New).await;
}

#[rstest]
#[tokio::test]
async fn concurrent_closes_tear_down_once(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let mut events = harness.client.subscribe();
    let first = harness.client.write(1);
    let second = harness.client.write(2);
    let mut server = harness.accept().await;
    read_request(&mut server).await;
    read_request(&mut server).await;

    let other = harness.client.clone();
    tokio::join!(harness.client.close("shutting down"), other.close("again"));

    let mut reasons = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ConnectionEvent::Closed { reason } = event {
            reasons.push(reason);
        }
    }
    assert_eq!(reasons.len(), 1, "expected one close, got {reasons:?}");
    assert!(["shutting down", "again"].contains(&reasons[0].as_str()));

    for pending in [first, second] {
        let err = pending.await.expect_err("closed");
        assert_eq!(err.to_string(), reasons[0]);
    }
    assert_eq!(harness.client.state(), ConnectionState::New);
    assert_eq!(harness.client.session_count(), 0);

    let mut rest = Vec::new();
    server.read_to_end(&mut rest).await.expect("read to eof");
    assert!(rest.is_empty());
}

#[rstest]
#[tokio::test]
async fn refused_connect_fails_every_outstanding_write(config: ClientConfig) {
    let client = EasySock::with_connector(config, Fixed, RefusingConnector).expect("valid config");
    let mut events = client.subscribe();

    let first = client.write(1);
    let second = client.write(2);
    for pending in [first, second] {
        let err = pending.await.expect_err("connect refused");
        assert_eq!(err.to_string(), "socket error:refused");
    }

    assert!(matches!(
        events.recv().await,
        Ok(ConnectionEvent::Error(EasySockError::Socket(_)))
    ));
    match events.recv().await {
        Ok(ConnectionEvent::Closed { reason }) => assert_eq!(reason, "socket error:refused"),
        other => panic!("expected close event, got {other:?}"),
    }
    wait_for_state(&client, ConnectionState::New).await;
    assert_eq!(client.session_count(), 0);
}

#[rstest]
#[tokio::test]
async fn exhausted_ids_reject_writes_until_one_is_answered(config: ClientConfig) {
    let mut harness = Harness::new(config.timeout(Duration::ZERO));
    harness.client.connect();
    let mut server = harness.accept().await;
    wait_for_state(&harness.client, ConnectionState::Alive).await;

    let mut pending: Vec<_> = (0..9_999).map(|value| harness.client.write(value)).collect();
    let err = harness.client.write(u32::MAX - 1).await.expect_err("no free id");
    assert_eq!(err.to_string(), "too many requests in flight");
    harness
        .client
        .watch_status()
        .wait_for(|status| status.in_flight == 9_999)
        .await
        .expect("connection task running");

    // Ids are handed out in write order, so the 5000th write holds id 5000.
    reply(&mut server, 5_000, 42).await;
    assert_eq!(pending.remove(4_999).await.expect("answered"), 42);

    let reused = harness.client.write(7);
    for expected in 1..=9_999 {
        let (seq, _) = read_request(&mut server).await;
        assert_eq!(seq, expected);
    }
    let (seq, value) = read_request(&mut server).await;
    assert_eq!((seq, value), (5_000, 7));
    reply(&mut server, seq, value).await;
    assert_eq!(reused.await.expect("response on reused id"), 7);
}

#[rstest]
#[tokio::test]
async fn next_write_after_close_reconnects(config: ClientConfig) {
    let mut harness = Harness::new(config);
    harness.client.connect();
    let _first = harness.accept().await;
    wait_for_state(&harness.client, ConnectionState::Alive).await;
    harness.client.close("bye").await;

    let response = harness.client.write(5);
    let mut server = harness.accept().await;
    let (seq, value) = read_request(&mut server).await;
    assert_eq!(seq, 1, "sequence restarts on a fresh connection");
    reply(&mut server, seq, value).await;
    assert_eq!(response.await.expect("response"), 5);
}

#[rstest]
#[tokio::test]
async fn repeated_connect_opens_one_socket(config: ClientConfig) {
    let mut harness = Harness::new(config);
    harness.client.connect();
    harness.client.connect();
    let mut server = harness.accept().await;
    harness.client.connect();

    let response = harness.client.write(3);
    let (seq, value) = read_request(&mut server).await;
    reply(&mut server, seq, value).await;
    response.await.expect("response");

    assert!(harness.accepted.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn peer_eof_fails_in_flight_requests(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let mut events = harness.client.subscribe();
    let pending = harness.client.write(1);
    let mut server = harness.accept().await;
    read_request(&mut server).await;
    drop(server);

    let err = pending.await.expect_err("peer closed");
    assert!(matches!(err, EasySockError::PeerClosed));
    loop {
        if let ConnectionEvent::Closed { reason } = events.recv().await.expect("event stream open") {
            assert_eq!(reason, "socket closed by peer");
            break;
        }
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn idle_connection_closes_itself(config: ClientConfig) {
    let mut harness = Harness::new(config.idle_timeout(Duration::from_millis(200)));
    let mut events = harness.client.subscribe();
    let response = harness.client.write(4);
    let mut server = harness.accept().await;
    let (seq, value) = read_request(&mut server).await;
    reply(&mut server, seq, value).await;
    response.await.expect("response");

    let mut saw_idle = false;
    loop {
        match events.recv().await.expect("event stream open") {
            ConnectionEvent::IdleTimeout => saw_idle = true,
            ConnectionEvent::Closed { reason } => {
                assert_eq!(reason, "socket is inactivity for 200ms");
                break;
            }
            _ => {}
        }
    }
    assert!(saw_idle);
    wait_for_state(&harness.client, ConnectionState::New).await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn keep_alive_connections_never_idle_out(config: ClientConfig) {
    let mut harness = Harness::new(config.keep_alive(true).idle_timeout(Duration::from_millis(10)));
    harness.client.connect();
    let _server = harness.accept().await;
    wait_for_state(&harness.client, ConnectionState::Alive).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.client.state(), ConnectionState::Alive);
}

#[rstest]
#[tokio::test]
async fn encode_failure_only_fails_that_request(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let bad = harness.client.write(u32::MAX);
    let good = harness.client.write(9);

    let mut server = harness.accept().await;
    let err = bad.await.expect_err("encode should fail");
    assert_eq!(err.to_string(), "encode error");

    let (seq, value) = read_request(&mut server).await;
    reply(&mut server, seq, value).await;
    assert_eq!(good.await.expect("response"), 9);
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn unknown_sequence_is_logged_and_published(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let mut events = harness.client.subscribe();
    let pending = harness.client.write(1);
    let mut server = harness.accept().await;
    let (seq, value) = read_request(&mut server).await;

    reply(&mut server, 42, 0).await;
    reply(&mut server, seq, value).await;
    assert_eq!(pending.await.expect("response"), 1);

    loop {
        if let ConnectionEvent::Error(err) = events.recv().await.expect("event stream open") {
            assert_eq!(err.to_string(), "Can't find context. 42");
            break;
        }
    }
    assert!(logs_contain("Can't find context. 42"));
    assert!(logs_contain("easy_sock connected"));
}

#[rstest]
#[tokio::test]
async fn zero_sequence_is_a_decode_error(config: ClientConfig) {
    let mut harness = Harness::new(config);
    let mut events = harness.client.subscribe();
    harness.client.connect();
    let mut server = harness.accept().await;
    reply(&mut server, 0, 1).await;

    loop {
        if let ConnectionEvent::Error(err) = events.recv().await.expect("event stream open") {
            assert!(matches!(err, EasySockError::Decode(_)));
            break;
        }
    }
    assert_eq!(harness.client.state(), ConnectionState::Alive);
}

#[test]
fn invalid_config_is_rejected_before_spawning() {
    let err = EasySock::new(ClientConfig::default(), Fixed).expect_err("missing endpoint");
    assert_eq!(err.to_string(), "needs config info: ip, port");
}
