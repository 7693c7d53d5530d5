//! Connection lifecycle states.

use thiserror::Error;

/// Lifecycle of a stream connection.
///
/// The only legal path is `New → Connecting → Alive → Closing → New`, with
/// `Connecting → Closing` allowed when setup fails or times out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket exists.
    #[default]
    New,
    /// The socket is being opened.
    Connecting,
    /// The socket is usable and requests are written immediately.
    Alive,
    /// The socket is being torn down.
    Closing,
}

/// Error returned for a transition outside the connection lifecycle.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("illegal connection transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    /// State the connection was in.
    pub from: ConnectionState,
    /// State that was requested.
    pub to: ConnectionState,
}

impl ConnectionState {
    /// Validate a move to `to`, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] for any move outside the lifecycle,
    /// including connecting twice and closing a connection that is already
    /// closed or closing.
    ///
    /// # Examples
    ///
    /// ```
    /// use easysock::ConnectionState;
    ///
    /// let state = ConnectionState::New.transition(ConnectionState::Connecting);
    /// assert_eq!(state, Ok(ConnectionState::Connecting));
    /// assert!(ConnectionState::New.transition(ConnectionState::Closing).is_err());
    /// ```
    pub fn transition(self, to: ConnectionState) -> Result<ConnectionState, IllegalTransition> {
        use ConnectionState::{Alive, Closing, Connecting, New};

        match (self, to) {
            (New, Connecting) | (Connecting, Alive) | (Connecting | Alive, Closing) | (Closing, New) => {
                Ok(to)
            }
            _ => Err(IllegalTransition { from: self, to }),
        }
    }

    /// Returns `true` while requests can be written immediately.
    #[must_use]
    pub fn is_alive(self) -> bool { matches!(self, ConnectionState::Alive) }
}
