//! Datagram client sending each request from its own socket.
//!
//! Replies to concurrent requests sharing one UDP socket can be delivered to
//! the wrong caller, so [`EasyUdp`] binds a fresh socket on an ephemeral port
//! for every request, waits for exactly one reply, and drops the socket.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use tokio::net::{UdpSocket, lookup_host};
use tracing::{Instrument, debug, debug_span, warn};

use crate::{
    codec::Codec,
    config::{DatagramConfig, Endpoint, as_millis},
    error::{EasySockError, Result},
    metrics::{self, TimeoutKind},
    sequence::{DATAGRAM_SEQUENCE_CEILING, SequenceCounter},
};

/// Largest payload a UDP datagram can carry.
const MAX_DATAGRAM: usize = 65_535;

/// One-reply-per-request datagram client.
///
/// Clones share the sequence counter, so concurrent calls from any clone
/// carry distinct ids.
pub struct EasyUdp<C: Codec> {
    codec: Arc<C>,
    endpoint: Arc<Endpoint>,
    timeout: Option<Duration>,
    sequence: Arc<SequenceCounter>,
}

impl<C: Codec> Clone for EasyUdp<C> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            endpoint: Arc::clone(&self.endpoint),
            timeout: self.timeout,
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl<C: Codec> std::fmt::Debug for EasyUdp<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EasyUdp")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> EasyUdp<C> {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EasySockError::Config`] if the ip or port is missing.
    pub fn new(config: DatagramConfig, codec: C) -> Result<Self> {
        let endpoint = config.validate()?;
        let timeout = config.timeout_value();
        Ok(Self {
            codec: Arc::new(codec),
            endpoint: Arc::new(endpoint),
            timeout: (!timeout.is_zero()).then_some(timeout),
            sequence: Arc::new(SequenceCounter::new(DATAGRAM_SEQUENCE_CEILING)),
        })
    }

    /// Send `request` and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`EasySockError::Encode`] without touching the network if
    /// encoding fails, [`EasySockError::DatagramTimeout`] if no reply arrives
    /// in time, [`EasySockError::Decode`] for an undecodable reply,
    /// [`EasySockError::SequenceMismatch`] for a reply to some other request,
    /// and [`EasySockError::Socket`] for I/O failures.
    pub async fn send(&self, request: C::Request) -> Result<C::Response> {
        let seq = self.sequence.next_id();
        let payload = self.codec.encode(&request, seq).map_err(|err| {
            warn!(seq, error = %err, "encode error");
            EasySockError::encode(err)
        })?;
        metrics::inc_requests();

        let exchange = self
            .exchange(seq, &payload)
            .instrument(debug_span!("easysock.datagram", peer = %self.endpoint, seq));
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .unwrap_or_else(|_| {
                    metrics::inc_timeouts(TimeoutKind::Datagram);
                    Err(EasySockError::DatagramTimeout {
                        timeout_ms: as_millis(timeout),
                    })
                }),
            None => exchange.await,
        };
        if let Err(err) = &result {
            warn!(seq, "{err}");
            metrics::inc_errors();
        }
        result
    }

    /// Alias of [`send`](Self::send) matching the stream client's naming.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn write(&self, request: C::Request) -> Result<C::Response> { self.send(request).await }

    /// Remote endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// One request on one socket. The socket closes when this future
    /// completes or is dropped by the timeout.
    async fn exchange(&self, seq: u32, payload: &[u8]) -> Result<C::Response> {
        let remote = resolve(&self.endpoint).await?;
        let socket = UdpSocket::bind(ephemeral_for(remote)).await?;
        socket.connect(remote).await?;
        socket.send(payload).await?;
        debug!(bytes = payload.len(), "request sent");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = socket.recv(&mut buf).await?;
        debug!(bytes = len, "reply received");

        let decoded = self
            .codec
            .decode(&buf[..len])
            .map_err(|err| EasySockError::Decode(err.to_string()))?;
        match decoded.seq {
            0 => Err(EasySockError::Decode("reply carries no sequence id".into())),
            received if received != seq => Err(EasySockError::SequenceMismatch { sent: seq, received }),
            _ => Ok(decoded.result),
        }
    }
}

async fn resolve(endpoint: &Endpoint) -> io::Result<SocketAddr> {
    lookup_host((endpoint.host(), endpoint.port()))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, format!("no address for {endpoint}")))
}

/// Wildcard address with an OS-assigned port, in the family of `remote`.
fn ephemeral_for(remote: SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    }
}
