//! Opening the byte stream a connection runs over.

use std::io;

use futures::future::BoxFuture;
use socket2::SockRef;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::config::Endpoint;

/// Trait alias for stream types a connection can own.
pub trait ClientStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
impl<T> ClientStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Opens a new stream to an endpoint.
///
/// The connection drops the returned future to abort a connect attempt, so
/// implementations must not rely on it running to completion.
pub trait Connector: Send + Sync + 'static {
    /// Stream produced by a successful connect.
    type Stream: ClientStream;

    /// Start connecting to `endpoint`.
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<Self::Stream>>;
}

/// Connects over TCP, applying socket options to each new stream.
///
/// # Examples
///
/// ```
/// use easysock::TcpConnector;
///
/// let connector = TcpConnector::default().keep_alive(true).nodelay(true);
/// let _ = connector;
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TcpConnector {
    keep_alive: bool,
    nodelay: bool,
}

impl TcpConnector {
    /// Enable `SO_KEEPALIVE` on connected sockets.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Enable `TCP_NODELAY` on connected sockets.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<TcpStream>> {
        let host = endpoint.host().to_owned();
        let port = endpoint.port();
        let Self { keep_alive, nodelay } = *self;
        Box::pin(async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            SockRef::from(&stream).set_keepalive(keep_alive)?;
            stream.set_nodelay(nodelay)?;
            Ok(stream)
        })
    }
}
