//! Sequence id generation for request correlation.

use std::sync::atomic::{AtomicU32, Ordering};

/// Ceiling for stream connection sequence ids.
pub const STREAM_SEQUENCE_CEILING: u32 = 10_000;

/// Ceiling for datagram client sequence ids.
pub const DATAGRAM_SEQUENCE_CEILING: u32 = 100_000;

/// Issues sequence ids in `1..ceiling`, wrapping back to `1`.
///
/// `0` is never issued so it can stand for "no id" in decoded frames.
///
/// # Examples
///
/// ```
/// use easysock::SequenceCounter;
///
/// let counter = SequenceCounter::new(3);
/// let ids: Vec<u32> = (0..4).map(|_| counter.next_id()).collect();
/// assert_eq!(ids, [1, 2, 1, 2]);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    last: AtomicU32,
    ceiling: u32,
}

impl SequenceCounter {
    /// Create a counter whose ids stay below `ceiling`.
    ///
    /// Ceilings below `2` are raised to `2` so at least one id exists.
    #[must_use]
    pub fn new(ceiling: u32) -> Self {
        Self {
            last: AtomicU32::new(0),
            ceiling: ceiling.max(2),
        }
    }

    /// Return the next id.
    pub fn next_id(&self) -> u32 {
        let ceiling = self.ceiling;
        let advance = |last: u32| {
            let next = (last + 1) % ceiling;
            Some(if next == 0 { 1 } else { next })
        };
        let previous = match self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, advance)
        {
            Ok(value) | Err(value) => value,
        };
        advance(previous).unwrap_or(1)
    }

    /// Number of distinct ids this counter can issue.
    #[must_use]
    pub fn capacity(&self) -> u32 { self.ceiling - 1 }

    /// Restart from `1`.
    pub fn reset(&self) { self.last.store(0, Ordering::Relaxed); }
}
