//! Timer registry for one connection.
//!
//! Every timer a connection owns lives in a single [`DelayQueue`]: the
//! connect timer, the idle timer, and one write timer per in-flight request.
//! Teardown cancels them all at once with [`TimerRegistry::clear`].

use std::{future::poll_fn, time::Duration};

use tokio_util::time::{DelayQueue, delay_queue::Key};

/// What an expired timer was guarding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Connect,
    Idle,
    Request(u32),
}

#[derive(Debug)]
pub(crate) struct TimerRegistry {
    queue: DelayQueue<TimerKind>,
    connect: Option<Key>,
    idle: Option<Key>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self {
            queue: DelayQueue::new(),
            connect: None,
            idle: None,
        }
    }
}

impl TimerRegistry {
    pub(crate) fn arm_connect(&mut self, timeout: Duration) {
        self.cancel_connect();
        self.connect = Some(self.queue.insert(TimerKind::Connect, timeout));
    }

    pub(crate) fn cancel_connect(&mut self) {
        if let Some(key) = self.connect.take() {
            self.queue.remove(&key);
        }
    }

    /// Restart the idle countdown, arming it if necessary.
    pub(crate) fn touch_idle(&mut self, timeout: Duration) {
        if let Some(key) = &self.idle {
            self.queue.reset(key, timeout);
            return;
        }
        self.idle = Some(self.queue.insert(TimerKind::Idle, timeout));
    }

    pub(crate) fn arm_request(&mut self, seq: u32, timeout: Duration) -> Key {
        self.queue.insert(TimerKind::Request(seq), timeout)
    }

    /// Cancel a request timer that has not yet expired.
    pub(crate) fn cancel_request(&mut self, key: &Key) { self.queue.remove(key); }

    /// Cancel every timer.
    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.connect = None;
        self.idle = None;
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize { self.queue.len() }

    /// Wait for the next timer to expire.
    ///
    /// Returns `None` immediately when no timer is armed. Cancellation safe:
    /// an expired entry is only taken from the queue in the poll that
    /// returns it.
    pub(crate) async fn expired(&mut self) -> Option<TimerKind> {
        let kind = poll_fn(|cx| self.queue.poll_expired(cx)).await?.into_inner();
        match kind {
            TimerKind::Connect => self.connect = None,
            TimerKind::Idle => self.idle = None,
            TimerKind::Request(_) => {}
        }
        Some(kind)
    }
}
