//! Connection events and the internal event type for the actor select loop.

use std::io;

use super::{Command, timers::TimerKind};
use crate::error::EasySockError;

/// Notifications published by a connection for observation.
///
/// Events are informational; request results are delivered through the
/// future returned by [`EasySock::write`](super::EasySock::write) whether or
/// not anyone subscribes.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// The socket became usable.
    Connected,
    /// Bytes arrived from the peer.
    DataReceived {
        /// Number of bytes in this read.
        bytes: usize,
    },
    /// A socket failure, an undecodable frame, or a response with no
    /// pending request.
    Error(EasySockError),
    /// The connection finished tearing down.
    Closed {
        /// Display text of the close cause.
        reason: String,
    },
    /// The idle timer fired; a close follows.
    IdleTimeout,
    /// The connect timer fired; a close follows.
    ConnectTimeout,
    /// A request timed out waiting for its response.
    WriteTimeout {
        /// Sequence id of the request.
        seq: u32,
    },
}

/// Progress reported by the socket side of the select loop.
pub(super) enum LinkEvent<S> {
    Connected(io::Result<S>),
    Read(io::Result<usize>),
    Wrote(io::Result<usize>),
}

/// Events returned by `Connection::next_event`.
pub(super) enum Event<Req, Resp, S> {
    /// A handle command, or `None` once every handle is dropped.
    Command(Option<Command<Req, Resp>>),
    Link(LinkEvent<S>),
    Timer(TimerKind),
}
