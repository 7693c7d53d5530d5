//! Stream client multiplexing concurrent requests over one connection.
//!
//! [`EasySock`] is a cheap, cloneable handle to a background task that owns
//! the socket. The task opens the connection on first use, queues requests
//! until it is ready, writes each request tagged with a sequence id, matches
//! responses back to their requests by that id, and enforces the connect,
//! request, and idle timeouts. Any connection-wide failure resolves every
//! outstanding request with the same error and resets the connection; the
//! next write reconnects.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::Instrument;

mod actor;
mod connector;
mod counter;
mod event;
mod queue;
mod state;
mod table;
mod timers;

use actor::Connection;
pub use connector::{ClientStream, Connector, TcpConnector};
pub use counter::active_connection_count;
pub use event::ConnectionEvent;
pub use state::{ConnectionState, IllegalTransition};
use table::Responder;

use crate::{
    codec::FrameCodec,
    config::{ClientConfig, Endpoint},
    error::{EasySockError, Result},
};

/// Capacity of the per-connection event channel.
const EVENT_CAPACITY: usize = 64;

/// Requests sent from handles to the connection task.
pub(crate) enum Command<Req, Resp> {
    Write { request: Req, responder: Responder<Resp> },
    Connect,
    Close { reason: String, done: oneshot::Sender<()> },
}

/// Snapshot of a connection's lifecycle and workload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Requests written and awaiting a response.
    pub in_flight: usize,
    /// Requests waiting for the connection to become usable.
    pub queued: usize,
}

/// Handle to a multiplexed stream connection.
///
/// # Examples
///
/// ```no_run
/// use easysock::{BoxError, ClientConfig, Codec, Decoded, EasySock, FrameCodec};
///
/// /// Newline-terminated `seq:text` lines.
/// struct Lines;
///
/// impl Codec for Lines {
///     type Request = String;
///     type Response = String;
///
///     fn encode(&self, request: &String, seq: u32) -> Result<Vec<u8>, BoxError> {
///         Ok(format!("{seq}:{request}\n").into_bytes())
///     }
///
///     fn decode(&self, frame: &[u8]) -> Result<Decoded<String>, BoxError> {
///         let line = std::str::from_utf8(frame)?.trim_end();
///         let (seq, text) = line.split_once(':').ok_or("missing separator")?;
///         Ok(Decoded::new(seq.parse()?, text.to_owned()))
///     }
/// }
///
/// impl FrameCodec for Lines {
///     fn frame_length(&self, buf: &[u8]) -> usize {
///         buf.iter().position(|b| *b == b'\n').map_or(0, |i| i + 1)
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), easysock::EasySockError> {
/// let client = EasySock::new(ClientConfig::new("127.0.0.1", 3000), Lines)?;
/// let reply = client.call("hello".to_owned()).await?;
/// println!("{reply}");
/// # Ok(())
/// # }
/// ```
pub struct EasySock<C: FrameCodec> {
    commands: mpsc::UnboundedSender<Command<C::Request, C::Response>>,
    events: broadcast::Sender<ConnectionEvent>,
    status: watch::Receiver<ConnectionStatus>,
    endpoint: Arc<Endpoint>,
}

impl<C: FrameCodec> Clone for EasySock<C> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            events: self.events.clone(),
            status: self.status.clone(),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

impl<C: FrameCodec> std::fmt::Debug for EasySock<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EasySock")
            .field("endpoint", &self.endpoint)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<C: FrameCodec> EasySock<C> {
    /// Create a TCP client for the configured endpoint.
    ///
    /// No socket is opened until the first write or [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`EasySockError::Config`] if the ip or port is missing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: ClientConfig, codec: C) -> Result<Self> {
        let connector = TcpConnector::default().keep_alive(config.keep_alive_value());
        Self::with_connector(config, codec, connector)
    }

    /// Create a client that opens its stream with `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`EasySockError::Config`] if the ip or port is missing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_connector<K: Connector>(config: ClientConfig, codec: C, connector: K) -> Result<Self> {
        let endpoint = config.validate()?;
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status) = watch::channel(ConnectionStatus::default());

        let span = tracing::info_span!("easysock.connection", peer = %endpoint);
        let connection = Connection::new(
            endpoint.clone(),
            config,
            codec,
            connector,
            commands_rx,
            events.clone(),
            status_tx,
        );
        tokio::spawn(connection.run().instrument(span));

        Ok(Self {
            commands,
            events,
            status,
            endpoint: Arc::new(endpoint),
        })
    }

    /// Submit a request without waiting for it to be written.
    ///
    /// The returned future resolves exactly once: with the matched
    /// response, a timeout, the error that tore the connection down, or an
    /// encode failure. Dropping it does not cancel the request.
    pub fn write(&self, request: C::Request) -> ResponseFuture<C::Response> {
        let (tx, rx) = oneshot::channel();
        let command = Command::Write {
            request,
            responder: Responder::new(tx),
        };
        // A closed channel drops the responder, which resolves the future
        // with `Stopped`.
        let _ = self.commands.send(command);
        ResponseFuture { rx }
    }

    /// Submit a request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns the [`EasySockError`] that resolved the request.
    pub async fn call(&self, request: C::Request) -> Result<C::Response> { self.write(request).await }

    /// Open the connection ahead of the first write. A no-op unless the
    /// connection is closed.
    pub fn connect(&self) { let _ = self.commands.send(Command::Connect); }

    /// Close the connection, failing every outstanding request with
    /// `reason`, and wait for teardown to finish.
    ///
    /// Closing an already closed connection does nothing. A later write
    /// reconnects.
    pub async fn close(&self, reason: impl Into<String>) {
        let (done, finished) = oneshot::channel();
        let command = Command::Close {
            reason: reason.into(),
            done,
        };
        if self.commands.send(command).is_ok() {
            let _ = finished.await;
        }
    }

    /// Subscribe to connection events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> { self.events.subscribe() }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus { *self.status.borrow() }

    /// Latest published lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.status().state }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn session_count(&self) -> usize { self.status().in_flight }

    /// Receiver notified whenever the status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> { self.status.clone() }

    /// Remote endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }
}

/// Future resolving to the result of one request.
#[must_use = "the response is only observed by awaiting the future"]
#[derive(Debug)]
pub struct ResponseFuture<R> {
    rx: oneshot::Receiver<Result<R>>,
}

impl<R> Future for ResponseFuture<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(EasySockError::Stopped)))
    }
}

#[cfg(test)]
mod tests;
