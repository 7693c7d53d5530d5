//! JSON codec for test traffic.
//!
//! Requests travel as `{"userid":<n>,"seq":<id>}` objects written back to
//! back with no delimiter. Frame boundaries are found by parsing the first
//! complete JSON value in the buffer.

use easysock::{BoxError, Codec, Decoded, FrameCodec};
use serde::{Deserialize, Serialize};

/// Request carried by the test codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserRequest {
    pub userid: u32,
}

impl UserRequest {
    #[must_use]
    pub fn new(userid: u32) -> Self { Self { userid } }
}

/// On-wire message in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReply {
    pub userid: u32,
    #[serde(default)]
    pub seq: u32,
}

/// Encodes [`UserRequest`]s as JSON and decodes echoed [`UserReply`]s,
/// resolving each request with its `userid`.
///
/// A request with `userid` of `u32::MAX` fails to encode.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Request = UserRequest;
    type Response = u32;

    fn encode(&self, request: &UserRequest, seq: u32) -> Result<Vec<u8>, BoxError> {
        if request.userid == u32::MAX {
            return Err("userid out of range".into());
        }
        let message = UserReply {
            userid: request.userid,
            seq,
        };
        Ok(serde_json::to_vec(&message)?)
    }

    fn decode(&self, frame: &[u8]) -> Result<Decoded<u32>, BoxError> {
        let reply: UserReply = serde_json::from_slice(frame)?;
        Ok(Decoded::new(reply.seq, reply.userid))
    }
}

impl FrameCodec for JsonCodec {
    fn frame_length(&self, buf: &[u8]) -> usize {
        let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<serde_json::Value>();
        match values.next() {
            Some(Ok(_)) => values.byte_offset(),
            // Incomplete values wait for more bytes. Garbage is handed to
            // `decode` whole so it is reported rather than buffered forever.
            Some(Err(err)) if err.is_eof() => 0,
            Some(Err(_)) => buf.len(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_finds_the_first_object() {
        let first = JsonCodec.encode(&UserRequest::new(11), 1).expect("encode");
        let mut buf = first.clone();
        buf.extend(JsonCodec.encode(&UserRequest::new(12), 2).expect("encode"));

        assert_eq!(JsonCodec.frame_length(&buf), first.len());
        assert_eq!(JsonCodec.frame_length(&first[..first.len() - 1]), 0);
        assert_eq!(JsonCodec.frame_length(b""), 0);
    }

    #[test]
    fn decode_reads_userid_and_seq() {
        let decoded = JsonCodec.decode(br#"{"userid":11,"seq":4}"#).expect("decode");
        assert_eq!((decoded.seq, decoded.result), (4, 11));
    }
}
