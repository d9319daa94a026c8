//! Incremental decoder for the client-side JSON stream

use crate::error::{ProtocolError, ProtocolResult};
use bytes::BytesMut;
use serde_json::Value;
use tracing::debug;

/// Maximum buffered input (64MB; BLOB payloads travel base64-encoded)
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Recovery behavior on malformed input.
///
/// Production decoders run lenient: a bad fragment is skipped and the
/// stream continues. Strict surfaces the error instead, which is what
/// tests and conformance tooling want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    #[default]
    Lenient,
    Strict,
}

/// Pull-based decoder over a concatenation of JSON objects.
///
/// The wire carries adjacent objects with no delimiter and no length
/// prefix, so `}{` marks two distinct objects. Each call to [`next`]
/// parses one value from the current offset and advances by exactly the
/// bytes that value consumed; trailing partial data stays buffered until
/// more input arrives.
///
/// [`next`]: JsonDecoder::next
pub struct JsonDecoder {
    buffer: BytesMut,
    policy: DecodePolicy,
}

enum Step {
    Empty,
    Value(Value, usize),
    Partial,
    Malformed(String),
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self::with_policy(DecodePolicy::default())
    }

    pub fn with_policy(policy: DecodePolicy) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            policy,
        }
    }

    /// Add data to the decoder buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.buffer.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Discard all buffered input
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Try to decode the next complete value from the buffer
    pub fn next(&mut self) -> ProtocolResult<Option<Value>> {
        loop {
            if self.buffer.is_empty() {
                return Ok(None);
            }

            let step = {
                let mut stream =
                    serde_json::Deserializer::from_slice(self.buffer.as_ref()).into_iter::<Value>();
                match stream.next() {
                    None => Step::Empty,
                    Some(Ok(value)) => Step::Value(value, stream.byte_offset()),
                    Some(Err(e)) if e.is_eof() => Step::Partial,
                    Some(Err(e)) => Step::Malformed(e.to_string()),
                }
            };

            match step {
                Step::Empty => {
                    // Only whitespace left
                    self.buffer.clear();
                    return Ok(None);
                }
                Step::Value(value, consumed) => {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(Some(value));
                }
                Step::Partial => return Ok(None),
                Step::Malformed(why) => match self.policy {
                    DecodePolicy::Strict => {
                        self.buffer.clear();
                        return Err(ProtocolError::InvalidJson(why));
                    }
                    DecodePolicy::Lenient => {
                        debug!(error = %why, "skipping malformed JSON fragment");
                        self.recover();
                    }
                },
            }
        }
    }

    /// Skip one byte, then forward to the next plausible object start
    fn recover(&mut self) {
        let _ = self.buffer.split_to(1);
        match self.buffer.iter().position(|&b| b == b'{') {
            Some(pos) => {
                let _ = self.buffer.split_to(pos);
            }
            None => self.buffer.clear(),
        }
    }
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adjacent_objects() {
        let mut decoder = JsonDecoder::new();
        decoder.feed(br#"{"a":1}{"b":2}"#).unwrap();

        assert_eq!(decoder.next().unwrap(), Some(json!({"a": 1})));
        assert_eq!(decoder.next().unwrap(), Some(json!({"b": 2})));
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn test_partial_object_buffers() {
        let mut decoder = JsonDecoder::new();
        decoder.feed(br#"{"device":"Ca"#).unwrap();

        assert_eq!(decoder.next().unwrap(), None);

        decoder.feed(br#"m"}"#).unwrap();
        assert_eq!(decoder.next().unwrap(), Some(json!({"device": "Cam"})));
    }

    #[test]
    fn test_split_between_objects() {
        let mut decoder = JsonDecoder::new();
        decoder.feed(br#"{"a":1}{"b""#).unwrap();

        assert_eq!(decoder.next().unwrap(), Some(json!({"a": 1})));
        assert_eq!(decoder.next().unwrap(), None);

        decoder.feed(br#":2}"#).unwrap();
        assert_eq!(decoder.next().unwrap(), Some(json!({"b": 2})));
    }

    #[test]
    fn test_lenient_skips_malformed() {
        let mut decoder = JsonDecoder::new();
        decoder.feed(br#"{"a":}{"b":2}"#).unwrap();

        assert_eq!(decoder.next().unwrap(), Some(json!({"b": 2})));
        assert_eq!(decoder.next().unwrap(), None);
    }

    #[test]
    fn test_lenient_skips_leading_garbage() {
        let mut decoder = JsonDecoder::new();
        decoder.feed(br#"%%%{"a":1}"#).unwrap();

        assert_eq!(decoder.next().unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_strict_surfaces_error() {
        let mut decoder = JsonDecoder::with_policy(DecodePolicy::Strict);
        decoder.feed(br#"{"a":}"#).unwrap();

        assert!(matches!(
            decoder.next(),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_whitespace_only_drains() {
        let mut decoder = JsonDecoder::new();
        decoder.feed(b"  \n\n  ").unwrap();

        assert_eq!(decoder.next().unwrap(), None);
        decoder.feed(br#"{"a":1}"#).unwrap();
        assert_eq!(decoder.next().unwrap(), Some(json!({"a": 1})));
    }
}
