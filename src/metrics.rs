//! Metric helpers for `easysock`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking established stream connections.
pub const CONNECTIONS_ACTIVE: &str = "easysock_connections_active";
/// Name of the counter tracking requests written to a socket.
pub const REQUESTS_TOTAL: &str = "easysock_requests_total";
/// Name of the counter tracking timeouts, labelled by `kind`.
pub const TIMEOUTS_TOTAL: &str = "easysock_timeouts_total";
/// Name of the counter tracking dropped frames and failed requests.
pub const ERRORS_TOTAL: &str = "easysock_errors_total";

/// Which timer expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The stream connection did not establish in time.
    Connect,
    /// A stream request received no response in time.
    Request,
    /// A stream connection was idle for too long.
    Idle,
    /// A datagram request received no reply in time.
    Datagram,
}

impl TimeoutKind {
    /// Label value recorded for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutKind::Connect => "connect",
            TimeoutKind::Request => "request",
            TimeoutKind::Idle => "idle",
            TimeoutKind::Datagram => "datagram",
        }
    }
}

/// Increment the active connections gauge.
#[cfg(feature = "metrics")]
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the active connections gauge.
#[cfg(feature = "metrics")]
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a request handed to a socket.
#[cfg(feature = "metrics")]
pub fn inc_requests() { counter!(REQUESTS_TOTAL).increment(1); }

/// Record an expired timer.
#[cfg(feature = "metrics")]
pub fn inc_timeouts(kind: TimeoutKind) {
    counter!(TIMEOUTS_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record an error occurrence.
#[cfg(feature = "metrics")]
pub fn inc_errors() { counter!(ERRORS_TOTAL).increment(1); }

/// Increment the active connections gauge.
#[cfg(not(feature = "metrics"))]
pub fn inc_connections() {}

/// Decrement the active connections gauge.
#[cfg(not(feature = "metrics"))]
pub fn dec_connections() {}

/// Record a request handed to a socket.
#[cfg(not(feature = "metrics"))]
pub fn inc_requests() {}

/// Record an expired timer.
#[cfg(not(feature = "metrics"))]
pub fn inc_timeouts(_kind: TimeoutKind) {}

/// Record an error occurrence.
#[cfg(not(feature = "metrics"))]
pub fn inc_errors() {}
