//! Canonical error and result types for the crate.
//!
//! [`EasySockError`] is shared by the stream and datagram clients. Errors are
//! `Clone` because a single connection-wide failure is delivered to every
//! request that was pending when the connection tore down.

use std::{io, sync::Arc};

use thiserror::Error;

/// Boxed error returned by caller-supplied codecs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout `easysock`.
pub type Result<T, E = EasySockError> = std::result::Result<T, E>;

/// Errors surfaced by [`EasySock`](crate::EasySock) and
/// [`EasyUdp`](crate::EasyUdp).
///
/// The `Display` text of each variant is stable; callers match on it when
/// bridging to systems that only carry error strings.
#[non_exhaustive]
#[derive(Debug, Error, Clone)]
pub enum EasySockError {
    /// Address or port missing from the configuration.
    #[error("needs config info: ip, port")]
    Config,
    /// The codec failed to encode a request. Local to that request.
    #[error("encode error")]
    Encode(#[source] Arc<dyn std::error::Error + Send + Sync>),
    /// No matching response arrived within the write timeout.
    #[error("request timeout({timeout_ms}ms)")]
    RequestTimeout {
        /// Configured write timeout in milliseconds.
        timeout_ms: u64,
    },
    /// The socket did not become usable within the connect timeout.
    #[error("easy_sock:TCP connect timeout({timeout_ms}ms)")]
    ConnectTimeout {
        /// Effective connect timeout in milliseconds.
        timeout_ms: u64,
    },
    /// The codec could not decode a frame, or the frame had no sequence id.
    #[error("decode buffer error: {0}")]
    Decode(String),
    /// A response carried a sequence id with no pending request.
    #[error("Can't find context. {0}")]
    UnknownSequence(u32),
    /// The underlying socket failed.
    #[error("socket error:{0}")]
    Socket(#[source] Arc<io::Error>),
    /// The connection saw no traffic for the idle timeout.
    #[error("socket is inactivity for {idle_ms}ms")]
    Idle {
        /// Configured idle timeout in milliseconds.
        idle_ms: u64,
    },
    /// The remote end closed the stream.
    #[error("socket closed by peer")]
    PeerClosed,
    /// The connection was closed on request; carries the caller's reason.
    #[error("{0}")]
    Closed(String),
    /// Every sequence id is held by an in-flight request.
    #[error("too many requests in flight")]
    TooManyInFlight,
    /// The connection task is gone and cannot resolve the request.
    #[error("connection task stopped")]
    Stopped,
    /// No datagram reply arrived within the timeout.
    #[error("easyudp: Request timeout({timeout_ms}ms)!")]
    DatagramTimeout {
        /// Configured datagram timeout in milliseconds.
        timeout_ms: u64,
    },
    /// A datagram reply answered a different request.
    #[error("easyudp: 发送的请求跟回调不匹配. send seq={sent}, received seq={received}")]
    SequenceMismatch {
        /// Sequence id sent with the request.
        sent: u32,
        /// Sequence id decoded from the reply.
        received: u32,
    },
}

impl EasySockError {
    /// Wrap a codec encode failure.
    #[must_use]
    pub fn encode(source: BoxError) -> Self { Self::Encode(Arc::from(source)) }

    /// Returns `true` for failures that tear down the whole connection.
    ///
    /// # Examples
    ///
    /// ```
    /// use easysock::EasySockError;
    ///
    /// assert!(EasySockError::PeerClosed.is_connection_wide());
    /// assert!(!EasySockError::RequestTimeout { timeout_ms: 5 }.is_connection_wide());
    /// ```
    #[must_use]
    pub fn is_connection_wide(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::Socket(_)
                | Self::Idle { .. }
                | Self::PeerClosed
                | Self::Closed(_)
        )
    }
}

impl From<io::Error> for EasySockError {
    fn from(error: io::Error) -> Self { Self::Socket(Arc::new(error)) }
}
