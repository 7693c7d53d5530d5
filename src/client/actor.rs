//! Connection task owning the socket and all per-connection state.
//!
//! The task polls handle commands, socket progress, and timer expiry in one
//! `tokio::select!` loop and handles each event to completion before polling
//! again, so no state needs locking. Socket reads and writes use the
//! cancellation-safe `read_buf`/`write_buf` so losing a race in the select
//! never drops data.

use std::{io, mem};

use bytes::BytesMut;
use futures::future::BoxFuture;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{broadcast, mpsc, watch},
};
use tracing::{debug, error, info, trace, warn};

use super::{
    Command,
    ConnectionEvent,
    ConnectionState,
    ConnectionStatus,
    Connector,
    counter::ActiveConnection,
    event::{Event, LinkEvent},
    queue::PendingQueue,
    table::{PendingRequest, RequestTable, Responder},
    timers::{TimerKind, TimerRegistry},
};
use crate::{
    assembler::FrameAssembler,
    codec::FrameCodec,
    config::{ClientConfig, Endpoint, as_millis},
    error::EasySockError,
    metrics::{self, TimeoutKind},
    sequence::{STREAM_SEQUENCE_CEILING, SequenceCounter},
};

/// The socket in whichever stage of its life it has reached.
enum Link<S> {
    Detached,
    Connecting(BoxFuture<'static, io::Result<S>>),
    Open {
        reader: ReadHalf<S>,
        writer: WriteHalf<S>,
        _active: ActiveConnection,
    },
}

pub(super) struct Connection<C: FrameCodec, K: Connector> {
    endpoint: Endpoint,
    config: ClientConfig,
    codec: C,
    connector: K,
    state: ConnectionState,
    link: Link<K::Stream>,
    assembler: FrameAssembler,
    outbound: BytesMut,
    sequence: SequenceCounter,
    requests: RequestTable<C::Response>,
    deferred: PendingQueue<C::Request, C::Response>,
    timers: TimerRegistry,
    commands: mpsc::UnboundedReceiver<Command<C::Request, C::Response>>,
    events: broadcast::Sender<ConnectionEvent>,
    status: watch::Sender<ConnectionStatus>,
}

impl<C: FrameCodec, K: Connector> Connection<C, K> {
    pub(super) fn new(
        endpoint: Endpoint,
        config: ClientConfig,
        codec: C,
        connector: K,
        commands: mpsc::UnboundedReceiver<Command<C::Request, C::Response>>,
        events: broadcast::Sender<ConnectionEvent>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        Self {
            endpoint,
            config,
            codec,
            connector,
            state: ConnectionState::New,
            link: Link::Detached,
            assembler: FrameAssembler::new(),
            outbound: BytesMut::new(),
            sequence: SequenceCounter::new(STREAM_SEQUENCE_CEILING),
            requests: RequestTable::default(),
            deferred: PendingQueue::default(),
            timers: TimerRegistry::default(),
            commands,
            events,
            status,
        }
    }

    /// Process events until every handle has been dropped.
    pub(super) async fn run(mut self) {
        loop {
            match self.next_event().await {
                Event::Command(Some(command)) => self.handle_command(command).await,
                Event::Command(None) => break,
                Event::Link(event) => self.handle_link(event).await,
                Event::Timer(kind) => self.handle_timer(kind).await,
            }
            self.publish_status();
        }
        self.close(EasySockError::Closed("client dropped".into())).await;
        debug!("connection task finished");
    }

    /// Await whichever source is ready first.
    ///
    /// With no timer armed the timer branch is disabled for that round, and
    /// a detached link never completes.
    async fn next_event(&mut self) -> Event<C::Request, C::Response, K::Stream> {
        tokio::select! {
            command = self.commands.recv() => Event::Command(command),
            Some(kind) = self.timers.expired() => Event::Timer(kind),
            event = poll_link(&mut self.link, self.assembler.buffer_mut(), &mut self.outbound) => {
                Event::Link(event)
            }
        }
    }

    async fn handle_command(&mut self, command: Command<C::Request, C::Response>) {
        match command {
            Command::Write { request, responder } => self.write(request, responder),
            Command::Connect => self.connect(),
            Command::Close { reason, done } => {
                self.close(EasySockError::Closed(reason)).await;
                let _ = done.send(());
            }
        }
    }

    async fn handle_link(&mut self, event: LinkEvent<K::Stream>) {
        match event {
            LinkEvent::Connected(Ok(stream)) => self.established(stream),
            LinkEvent::Read(Ok(0)) => {
                info!("peer closed the connection");
                self.close(EasySockError::PeerClosed).await;
            }
            LinkEvent::Read(Ok(bytes)) => self.received(bytes),
            LinkEvent::Wrote(Ok(0)) => self.fail(io::ErrorKind::WriteZero.into()).await,
            LinkEvent::Wrote(Ok(bytes)) => {
                trace!(bytes, "wrote request bytes");
                self.touch_idle();
            }
            LinkEvent::Connected(Err(err)) | LinkEvent::Read(Err(err)) | LinkEvent::Wrote(Err(err)) => {
                self.fail(err).await;
            }
        }
    }

    async fn handle_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Connect => {
                let timeout_ms = as_millis(self.config.connect_timeout_value());
                warn!(timeout_ms, "connect timed out");
                metrics::inc_timeouts(TimeoutKind::Connect);
                self.emit(ConnectionEvent::ConnectTimeout);
                self.close(EasySockError::ConnectTimeout { timeout_ms }).await;
            }
            TimerKind::Idle => {
                let idle_ms = as_millis(self.config.idle_timeout_value());
                info!(idle_ms, "closing idle connection");
                metrics::inc_timeouts(TimeoutKind::Idle);
                self.emit(ConnectionEvent::IdleTimeout);
                self.close(EasySockError::Idle { idle_ms }).await;
            }
            TimerKind::Request(seq) => {
                // The timer has already left the registry, so the entry's key
                // must not be cancelled.
                let Some(pending) = self.requests.remove(seq) else {
                    return;
                };
                let timeout_ms = as_millis(self.config.timeout_value());
                warn!(seq, timeout_ms, "request timed out");
                metrics::inc_timeouts(TimeoutKind::Request);
                self.emit(ConnectionEvent::WriteTimeout { seq });
                pending
                    .responder
                    .resolve(Err(EasySockError::RequestTimeout { timeout_ms }));
            }
        }
    }

    fn write(&mut self, request: C::Request, responder: Responder<C::Response>) {
        if self.state.is_alive() {
            self.submit(request, responder);
            return;
        }
        trace!(state = ?self.state, "deferring write until connected");
        self.deferred.push(request, responder);
        self.connect();
    }

    /// Start connecting if the connection is closed.
    fn connect(&mut self) {
        if !self.enter(ConnectionState::Connecting) {
            return;
        }
        info!("connecting");
        self.link = Link::Connecting(self.connector.connect(&self.endpoint));
        if let Some(timeout) = self.config.connect_deadline() {
            self.timers.arm_connect(timeout);
        }
    }

    fn established(&mut self, stream: K::Stream) {
        if !self.enter(ConnectionState::Alive) {
            self.link = Link::Detached;
            return;
        }
        self.timers.cancel_connect();
        let (reader, writer) = tokio::io::split(stream);
        self.link = Link::Open {
            reader,
            writer,
            _active: ActiveConnection::new(),
        };
        self.touch_idle();
        info!(queued = self.deferred.len(), "easy_sock connected");
        self.emit(ConnectionEvent::Connected);

        for deferred in self.deferred.take_all() {
            self.submit(deferred.request, deferred.responder);
        }
    }

    /// Encode and queue a request on a live connection.
    fn submit(&mut self, request: C::Request, responder: Responder<C::Response>) {
        let Some(seq) = self.allocate_seq() else {
            warn!(in_flight = self.requests.len(), "no free sequence id");
            responder.resolve(Err(EasySockError::TooManyInFlight));
            return;
        };
        let bytes = match self.codec.encode(&request, seq) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(seq, error = %err, "encode error");
                metrics::inc_errors();
                responder.resolve(Err(EasySockError::encode(err)));
                return;
            }
        };

        let timer = self
            .config
            .request_deadline()
            .map(|timeout| self.timers.arm_request(seq, timeout));
        self.requests.insert(seq, PendingRequest::new(responder, timer));
        self.outbound.extend_from_slice(&bytes);
        metrics::inc_requests();
        trace!(seq, bytes = bytes.len(), "request queued for write");
    }

    /// Next id not held by an in-flight request.
    fn allocate_seq(&self) -> Option<u32> {
        (0..self.sequence.capacity())
            .map(|_| self.sequence.next_id())
            .find(|seq| !self.requests.contains(*seq))
    }

    fn received(&mut self, bytes: usize) {
        trace!(bytes, "received");
        self.emit(ConnectionEvent::DataReceived { bytes });
        self.touch_idle();

        while let Some(frame) = self.assembler.next_frame(|buf| self.codec.frame_length(buf)) {
            let result = match self.codec.decode(&frame) {
                Ok(decoded) if decoded.seq == 0 => {
                    Err(EasySockError::Decode("frame carries no sequence id".into()))
                }
                Ok(decoded) => Ok(decoded),
                Err(err) => Err(EasySockError::Decode(err.to_string())),
            };
            match result {
                Ok(decoded) => self.resolve(decoded.seq, decoded.result),
                Err(err) => self.drop_frame(err),
            }
        }
    }

    fn resolve(&mut self, seq: u32, response: C::Response) {
        let Some(pending) = self.requests.remove(seq) else {
            self.drop_frame(EasySockError::UnknownSequence(seq));
            return;
        };
        if let Some(key) = &pending.timer {
            self.timers.cancel_request(key);
        }
        trace!(seq, "response matched");
        pending.responder.resolve(Ok(response));
    }

    /// Report a frame that resolves nothing; its request keeps waiting on
    /// its own timer.
    fn drop_frame(&self, err: EasySockError) {
        warn!("{err}");
        metrics::inc_errors();
        self.emit(ConnectionEvent::Error(err));
    }

    async fn fail(&mut self, err: io::Error) {
        let err = EasySockError::from(err);
        error!("{err}");
        metrics::inc_errors();
        self.emit(ConnectionEvent::Error(err.clone()));
        self.close(err).await;
    }

    /// Tear the connection down, resolving all outstanding work with `cause`.
    ///
    /// Does nothing unless the connection is connecting or alive.
    async fn close(&mut self, cause: EasySockError) {
        if !self.enter(ConnectionState::Closing) {
            return;
        }
        self.publish_status();
        self.timers.cancel_connect();

        match mem::replace(&mut self.link, Link::Detached) {
            Link::Connecting(_) => debug!("connect attempt aborted"),
            Link::Open { reader, mut writer, _active } => {
                if let Err(err) = writer.shutdown().await {
                    debug!(error = %err, "shutdown failed");
                }
                drop(reader);
            }
            Link::Detached => {}
        }

        let failed = self.requests.fail_all(&cause) + self.deferred.fail_all(&cause);
        self.timers.clear();
        self.sequence.reset();
        self.assembler.clear();
        self.outbound.clear();
        self.enter(ConnectionState::New);

        info!(reason = %cause, failed, "easy_sock closed");
        self.emit(ConnectionEvent::Closed {
            reason: cause.to_string(),
        });
    }

    fn touch_idle(&mut self) {
        if let Some(timeout) = self.config.idle_deadline() {
            self.timers.touch_idle(timeout);
        }
    }

    /// Move to `next`, returning `false` if the lifecycle forbids it.
    fn enter(&mut self, next: ConnectionState) -> bool {
        match self.state.transition(next) {
            Ok(state) => {
                self.state = state;
                true
            }
            Err(err) => {
                trace!(%err, "transition ignored");
                false
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events.receiver_count() > 0 {
            let _ = self.events.send(event);
        }
    }

    fn publish_status(&self) {
        let next = ConnectionStatus {
            state: self.state,
            in_flight: self.requests.len(),
            queued: self.deferred.len(),
        };
        self.status.send_if_modified(|status| {
            let changed = *status != next;
            *status = next;
            changed
        });
    }
}

/// Wait for the socket to make progress.
///
/// Reads are always polled on an open link; writes only while `outbound`
/// holds bytes.
async fn poll_link<S>(link: &mut Link<S>, inbound: &mut BytesMut, outbound: &mut BytesMut) -> LinkEvent<S>
where
    S: super::ClientStream,
{
    match link {
        Link::Detached => std::future::pending().await,
        Link::Connecting(connecting) => LinkEvent::Connected(connecting.await),
        Link::Open { reader, writer, .. } => {
            if outbound.is_empty() {
                return LinkEvent::Read(reader.read_buf(inbound).await);
            }
            tokio::select! {
                read = reader.read_buf(inbound) => LinkEvent::Read(read),
                written = writer.write_buf(outbound) => LinkEvent::Wrote(written),
            }
        }
    }
}
