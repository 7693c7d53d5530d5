//! In-memory connectors for driving an [`EasySock`](easysock::EasySock)
//! without a network.

use std::io;

use easysock::{Connector, Endpoint};
use futures::future::{self, BoxFuture};
use tokio::{
    io::DuplexStream,
    sync::mpsc,
};

const DUPLEX_CAPACITY: usize = 4096;

/// Connects over `tokio::io::duplex`, handing the server end of each new
/// pair to the test.
#[derive(Debug)]
pub struct DuplexConnector {
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

impl DuplexConnector {
    /// Create a connector and the receiver of accepted server ends.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (Self { accepted }, rx)
    }
}

impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, io::Result<DuplexStream>> {
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        let result = self
            .accepted
            .send(server)
            .map(|()| client)
            .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused));
        Box::pin(future::ready(result))
    }
}

/// A connector whose connect attempts never finish, standing in for an
/// unreachable host.
#[derive(Clone, Copy, Debug, Default)]
pub struct StalledConnector;

impl Connector for StalledConnector {
    type Stream = DuplexStream;

    fn connect(&self, _endpoint: &Endpoint) -> BoxFuture<'static, io::Result<DuplexStream>> {
        Box::pin(future::pending())
    }
}
