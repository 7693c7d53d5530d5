#![doc(html_root_url = "https://docs.rs/easysock/latest")]
//! Public API for the `easysock` library.
//!
//! `easysock` turns a byte-stream or datagram socket into a request/response
//! facility. Applications describe their wire format with a [`Codec`] (and,
//! for streams, a [`FrameCodec`]); the library handles connecting, queueing
//! requests made before the connection is ready, correlating concurrent
//! responses by sequence id, timeouts, and closing idle connections.
//!
//! - [`EasySock`] multiplexes many in-flight requests over one TCP (or any
//!   async byte stream) connection owned by a background task.
//! - [`EasyUdp`] sends each request from its own short-lived UDP socket.

pub mod assembler;
pub mod client;
pub mod codec;
pub mod config;
pub mod datagram;
pub mod error;
pub mod metrics;
pub mod sequence;

pub use assembler::FrameAssembler;
pub use client::{
    ClientStream,
    ConnectionEvent,
    ConnectionState,
    ConnectionStatus,
    Connector,
    EasySock,
    IllegalTransition,
    ResponseFuture,
    TcpConnector,
    active_connection_count,
};
pub use codec::{Codec, Decoded, FrameCodec};
pub use config::{ClientConfig, DatagramConfig, Endpoint};
pub use datagram::EasyUdp;
pub use error::{BoxError, EasySockError, Result};
pub use sequence::SequenceCounter;
