//! Reassembly of complete frames from arbitrary read boundaries.
//!
//! Stream sockets deliver bytes in chunks that bear no relation to frame
//! boundaries: one read may carry half a frame, or several frames back to
//! back. [`FrameAssembler`] buffers what has arrived and carves complete
//! frames off the front using a caller-supplied length detector.

use bytes::{Bytes, BytesMut};

const INITIAL_CAPACITY: usize = 8 * 1024;

/// Accumulates received bytes and yields complete frames in arrival order.
///
/// # Examples
///
/// ```
/// use easysock::FrameAssembler;
///
/// let mut assembler = FrameAssembler::new();
/// assembler.extend_from_slice(b"abcdef");
///
/// let fixed = |buf: &[u8]| if buf.len() >= 4 { 4 } else { 0 };
/// assert_eq!(assembler.next_frame(fixed).as_deref(), Some(&b"abcd"[..]));
/// assert_eq!(assembler.next_frame(fixed), None);
/// assert_eq!(assembler.buffered(), 2);
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
}

impl Default for FrameAssembler {
    fn default() -> Self { Self::new() }
}

impl FrameAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append received bytes.
    pub fn extend_from_slice(&mut self, data: &[u8]) { self.buf.extend_from_slice(data); }

    /// Buffer that socket reads append to directly.
    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        if self.buf.capacity() == self.buf.len() {
            self.buf.reserve(INITIAL_CAPACITY);
        }
        &mut self.buf
    }

    /// Split the next complete frame off the buffer.
    ///
    /// `frame_length` returns how many leading bytes form one frame, or `0`
    /// if more data is needed. A length larger than the buffered data also
    /// waits for more, so a miscomputed length cannot slice past the end of
    /// the buffer. The trailing partial frame stays buffered.
    pub fn next_frame(&mut self, frame_length: impl Fn(&[u8]) -> usize) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        let len = frame_length(&self.buf);
        if len == 0 || len > self.buf.len() {
            return None;
        }
        Some(self.buf.split_to(len).freeze())
    }

    /// Number of bytes waiting for the rest of their frame.
    #[must_use]
    pub fn buffered(&self) -> usize { self.buf.len() }

    /// Discard everything buffered.
    pub fn clear(&mut self) { self.buf.clear(); }
}
