//! Client configuration.
//!
//! [`ClientConfig`] configures the stream client and [`DatagramConfig`] the
//! datagram client. Both can be built in code or deserialised with `serde`
//! from camelCase keys, with every duration given in milliseconds:
//!
//! ```
//! use std::time::Duration;
//!
//! use easysock::ClientConfig;
//!
//! let config = ClientConfig::new("127.0.0.1", 3000)
//!     .keep_alive(true)
//!     .timeout(Duration::from_millis(500));
//! assert_eq!(config.connect_timeout_value(), Duration::from_millis(1500));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{EasySockError, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default datagram request timeout.
pub const DEFAULT_DATAGRAM_TIMEOUT: Duration = Duration::from_secs(5);
/// Connection setup gets this many request timeouts unless overridden.
pub const CONNECT_TIMEOUT_MULTIPLIER: u32 = 3;

/// Configuration for [`EasySock`](crate::EasySock).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    ip: Option<String>,
    port: Option<u16>,
    keep_alive: bool,
    #[serde(with = "millis")]
    timeout: Duration,
    #[serde(with = "millis")]
    idle_timeout: Duration,
    #[serde(with = "optional_millis")]
    connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ip: None,
            port: None,
            keep_alive: false,
            timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for `ip:port` with default timeouts.
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: Some(ip.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Keep the connection open indefinitely, disabling the idle monitor
    /// and enabling TCP keep-alive probes.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Per-request timeout. [`Duration::ZERO`] disables it.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Inactivity span after which the connection closes itself.
    /// [`Duration::ZERO`] disables it.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the connect timeout, which otherwise defaults to
    /// [`CONNECT_TIMEOUT_MULTIPLIER`] request timeouts.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Remote host, if configured.
    #[must_use]
    pub fn ip_value(&self) -> Option<&str> { self.ip.as_deref() }

    /// Remote port, if configured.
    #[must_use]
    pub fn port_value(&self) -> Option<u16> { self.port }

    /// Whether keep-alive is enabled.
    #[must_use]
    pub fn keep_alive_value(&self) -> bool { self.keep_alive }

    /// Configured request timeout.
    #[must_use]
    pub fn timeout_value(&self) -> Duration { self.timeout }

    /// Configured idle timeout.
    #[must_use]
    pub fn idle_timeout_value(&self) -> Duration { self.idle_timeout }

    /// Effective connect timeout.
    #[must_use]
    pub fn connect_timeout_value(&self) -> Duration {
        self.connect_timeout
            .unwrap_or_else(|| self.timeout.saturating_mul(CONNECT_TIMEOUT_MULTIPLIER))
    }

    /// Request timeout, or `None` when disabled.
    pub(crate) fn request_deadline(&self) -> Option<Duration> { non_zero(self.timeout) }

    /// Connect timeout, or `None` when disabled.
    pub(crate) fn connect_deadline(&self) -> Option<Duration> {
        non_zero(self.connect_timeout_value())
    }

    /// Idle timeout, or `None` when keep-alive or a zero span disables it.
    pub(crate) fn idle_deadline(&self) -> Option<Duration> {
        if self.keep_alive {
            None
        } else {
            non_zero(self.idle_timeout)
        }
    }

    /// Check that the remote endpoint is fully specified.
    ///
    /// # Errors
    ///
    /// Returns [`EasySockError::Config`] when the ip is missing or empty, or
    /// the port is missing or zero.
    pub fn validate(&self) -> Result<Endpoint> { Endpoint::from_parts(self.ip.as_deref(), self.port) }
}

/// Configuration for [`EasyUdp`](crate::EasyUdp).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DatagramConfig {
    ip: Option<String>,
    port: Option<u16>,
    #[serde(with = "millis")]
    timeout: Duration,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            ip: None,
            port: None,
            timeout: DEFAULT_DATAGRAM_TIMEOUT,
        }
    }
}

impl DatagramConfig {
    /// Configuration for `ip:port` with the default timeout.
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: Some(ip.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Reply timeout. [`Duration::ZERO`] waits forever.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured reply timeout.
    #[must_use]
    pub fn timeout_value(&self) -> Duration { self.timeout }

    /// Check that the remote endpoint is fully specified.
    ///
    /// # Errors
    ///
    /// Returns [`EasySockError::Config`] when the ip or port is missing.
    pub fn validate(&self) -> Result<Endpoint> { Endpoint::from_parts(self.ip.as_deref(), self.port) }
}

/// A validated remote host and port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    fn from_parts(ip: Option<&str>, port: Option<u16>) -> Result<Self> {
        match (ip, port) {
            (Some(host), Some(port)) if !host.is_empty() && port != 0 => Ok(Self {
                host: host.to_owned(),
                port,
            }),
            _ => Err(EasySockError::Config),
        }
    }

    /// Remote host name or address.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Remote port.
    #[must_use]
    pub fn port(&self) -> u16 { self.port }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn non_zero(duration: Duration) -> Option<Duration> { (!duration.is_zero()).then_some(duration) }

/// Whole milliseconds, as used by error messages.
pub(crate) fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
