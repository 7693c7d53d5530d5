//! Writes deferred until the connection becomes usable.

use std::collections::VecDeque;

use super::table::Responder;
use crate::error::EasySockError;

/// A write made before the connection was alive.
#[derive(Debug)]
pub(crate) struct DeferredWrite<Req, Resp> {
    pub(crate) request: Req,
    pub(crate) responder: Responder<Resp>,
}

/// FIFO of deferred writes, consumed exactly once by replay or failure.
#[derive(Debug)]
pub(crate) struct PendingQueue<Req, Resp> {
    writes: VecDeque<DeferredWrite<Req, Resp>>,
}

impl<Req, Resp> Default for PendingQueue<Req, Resp> {
    fn default() -> Self {
        Self {
            writes: VecDeque::new(),
        }
    }
}

impl<Req, Resp> PendingQueue<Req, Resp> {
    pub(crate) fn push(&mut self, request: Req, responder: Responder<Resp>) {
        self.writes.push_back(DeferredWrite { request, responder });
    }

    pub(crate) fn len(&self) -> usize { self.writes.len() }

    /// Take every deferred write in submission order, leaving the queue empty.
    pub(crate) fn take_all(&mut self) -> VecDeque<DeferredWrite<Req, Resp>> { std::mem::take(&mut self.writes) }

    /// Resolve every deferred write with `error`.
    pub(crate) fn fail_all(&mut self, error: &EasySockError) -> usize {
        let writes = self.take_all();
        let count = writes.len();
        for write in writes {
            write.responder.resolve(Err(error.clone()));
        }
        count
    }
}
