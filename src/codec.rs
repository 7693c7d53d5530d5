//! Caller-supplied codecs for request/response protocols.
//!
//! `easysock` never defines an on-wire layout. Applications describe their
//! protocol by implementing [`Codec`] (encode a request together with its
//! sequence id, decode a frame back into a correlated response) and, for
//! stream transports, [`FrameCodec`] to locate frame boundaries in the
//! receive buffer.
//!
//! Codecs should be pure: the client may call them from its connection task
//! at any point and does not expect them to retain state between calls.

use crate::error::BoxError;

/// A decoded response together with the sequence id used to correlate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded<R> {
    /// Sequence id carried by the frame. `0` means the frame had none.
    pub seq: u32,
    /// Application result delivered to the waiting request.
    pub result: R,
}

impl<R> Decoded<R> {
    /// Pair a result with the sequence id it answers.
    #[must_use]
    pub fn new(seq: u32, result: R) -> Self { Self { seq, result } }
}

/// Encode requests and decode responses for one protocol.
///
/// # Examples
///
/// ```
/// use easysock::{BoxError, Codec, Decoded};
///
/// struct Echo;
///
/// impl Codec for Echo {
///     type Request = u8;
///     type Response = u8;
///
///     fn encode(&self, request: &u8, seq: u32) -> Result<Vec<u8>, BoxError> {
///         let seq = u8::try_from(seq)?;
///         Ok(vec![seq, *request])
///     }
///
///     fn decode(&self, frame: &[u8]) -> Result<Decoded<u8>, BoxError> {
///         match frame {
///             [seq, value] => Ok(Decoded::new(u32::from(*seq), *value)),
///             _ => Err("expected two bytes".into()),
///         }
///     }
/// }
///
/// let bytes = Echo.encode(&9, 1).expect("encode");
/// assert_eq!(Echo.decode(&bytes).expect("decode"), Decoded::new(1, 9));
/// ```
pub trait Codec: Send + Sync + 'static {
    /// Application payload accepted by `write`.
    type Request: Send + 'static;
    /// Application result produced for each matched response.
    type Response: Send + 'static;

    /// Encode `request`, embedding `seq` so the peer can echo it back.
    ///
    /// # Errors
    ///
    /// Any error fails only the request being encoded.
    fn encode(&self, request: &Self::Request, seq: u32) -> Result<Vec<u8>, BoxError>;

    /// Decode one complete frame.
    ///
    /// # Errors
    ///
    /// A decode error drops the frame; the request it answered is left to
    /// its own timeout.
    fn decode(&self, frame: &[u8]) -> Result<Decoded<Self::Response>, BoxError>;
}

/// A [`Codec`] that can also find frame boundaries in a byte stream.
pub trait FrameCodec: Codec {
    /// Length of the complete frame at the start of `buf`.
    ///
    /// Return `0` when `buf` does not yet hold a complete frame. A length
    /// greater than `buf.len()` is treated the same way.
    fn frame_length(&self, buf: &[u8]) -> usize;
}
