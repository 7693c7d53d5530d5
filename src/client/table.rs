//! In-flight request bookkeeping keyed by sequence id.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio_util::time::delay_queue::Key;

use crate::error::{EasySockError, Result};

/// Delivers exactly one result to the caller awaiting a request.
///
/// Resolving consumes the responder, so a request cannot be answered twice.
#[derive(Debug)]
pub(crate) struct Responder<R>(oneshot::Sender<Result<R>>);

impl<R> Responder<R> {
    pub(crate) fn new(tx: oneshot::Sender<Result<R>>) -> Self { Self(tx) }

    /// Hand `result` to the caller. A caller that stopped waiting is ignored.
    pub(crate) fn resolve(self, result: Result<R>) { let _ = self.0.send(result); }
}

/// A request written to the socket and awaiting its response.
#[derive(Debug)]
pub(crate) struct PendingRequest<R> {
    pub(crate) responder: Responder<R>,
    /// Write-timeout timer, absent when request timeouts are disabled.
    pub(crate) timer: Option<Key>,
}

impl<R> PendingRequest<R> {
    pub(crate) fn new(responder: Responder<R>, timer: Option<Key>) -> Self { Self { responder, timer } }
}

/// Pending requests indexed by sequence id.
#[derive(Debug)]
pub(crate) struct RequestTable<R> {
    entries: HashMap<u32, PendingRequest<R>>,
}

impl<R> Default for RequestTable<R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<R> RequestTable<R> {
    /// Track `request` under `seq`. The id must not already be in flight.
    pub(crate) fn insert(&mut self, seq: u32, request: PendingRequest<R>) {
        let displaced = self.entries.insert(seq, request);
        debug_assert!(displaced.is_none(), "sequence id {seq} already in flight");
    }

    /// Stop tracking `seq`. Only the first removal returns the entry.
    pub(crate) fn remove(&mut self, seq: u32) -> Option<PendingRequest<R>> { self.entries.remove(&seq) }

    pub(crate) fn contains(&self, seq: u32) -> bool { self.entries.contains_key(&seq) }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    /// Resolve every pending request with `error`, leaving the table empty.
    ///
    /// Timer keys are discarded rather than cancelled; the caller clears the
    /// timer registry as part of the same teardown.
    pub(crate) fn fail_all(&mut self, error: &EasySockError) -> usize {
        let count = self.entries.len();
        for (_, pending) in self.entries.drain() {
            pending.responder.resolve(Err(error.clone()));
        }
        count
    }
}
