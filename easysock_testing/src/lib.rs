//! Test utilities for `easysock` clients.
//!
//! Provides a JSON codec shaped like the `{ userid, seq }` messages used
//! throughout the test suite, loopback TCP and UDP servers, in-memory
//! connectors, and a serialised `logtest` logger fixture.
//!
//! ```rust,no_run
//! use easysock::{ClientConfig, EasySock};
//! use easysock_testing::{JsonCodec, UserRequest, spawn_tcp_echo};
//!
//! # async fn example() {
//! let (addr, _server) = spawn_tcp_echo().await;
//! let client = EasySock::new(ClientConfig::new("127.0.0.1", addr.port()), JsonCodec).unwrap();
//! assert_eq!(client.call(UserRequest::new(11)).await.unwrap(), 11);
//! # }
//! ```

pub mod codec;
pub mod connectors;
pub mod logging;
pub mod servers;

pub use codec::{JsonCodec, UserReply, UserRequest};
pub use connectors::{DuplexConnector, StalledConnector};
pub use logging::{LoggerHandle, logger};
pub use servers::{ServerMode, spawn_tcp_echo, spawn_udp_server};
