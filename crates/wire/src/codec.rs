//! Length-prefixed framing for agent messages using tokio-util.
//!
//! Every frame is a big-endian `u32` payload length followed by the payload:
//!
//! ```text
//! [len: u32 BE][kind: u32 BE][kind specific fields ...]
//!  \__ 4 ____/ \_____________ len bytes ______________/
//! ```
//!
//! The decoder is resumable: bytes may arrive in any chunking, including one
//! byte at a time, and several frames may share one read.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::Message;

/// Default maximum frame payload size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_LEN: usize = 4;
const KIND_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for the four byte length prefix.
    Head,
    /// The prefix has been consumed; `remaining` payload bytes make up the frame.
    Payload { remaining: usize },
}

/// Codec for encoding and decoding agent frames.
///
/// # Example
///
/// ```ignore
/// use tokio_util::codec::FramedRead;
/// use wire::AgentCodec;
///
/// let framed = FramedRead::new(socket_read_half, AgentCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct AgentCodec {
    max_frame_size: usize,
    state: DecodeState,
}

impl AgentCodec {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Frames declaring more than `max_frame_size` payload bytes are rejected
    /// with [`CodecError::FrameTooLarge`] before any of the payload is buffered.
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            state: DecodeState::Head,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for AgentCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AgentCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame_len = match self.state {
            DecodeState::Head => {
                if src.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let frame_len = src.get_u32() as usize;
                if frame_len > self.max_frame_size {
                    return Err(CodecError::FrameTooLarge {
                        size: frame_len,
                        max: self.max_frame_size,
                    });
                }
                if frame_len < KIND_LEN {
                    return Err(CodecError::FrameTooSmall(frame_len));
                }
                self.state = DecodeState::Payload {
                    remaining: frame_len,
                };
                frame_len
            }
            DecodeState::Payload { remaining } => remaining,
        };

        if src.len() < frame_len {
            // Need more data - reserve space for efficiency
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let payload = src.split_to(frame_len).freeze();
        self.state = DecodeState::Head;

        let message = Message::decode(payload)?;
        tracing::trace!(?message, "decoded agent frame");
        Ok(Some(message))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.is_empty() && self.state == DecodeState::Head {
            return Ok(None);
        }
        Err(CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed in the middle of a frame",
        )))
    }
}

impl Encoder<Message> for AgentCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        // Placeholder prefix, patched once the payload size is known
        dst.put_u32(0);
        if let Err(e) = item.encode(dst) {
            dst.truncate(start);
            return Err(e);
        }

        let payload_len = dst.len() - start - LENGTH_PREFIX_LEN;
        let declared = match u32::try_from(payload_len) {
            Ok(len) if payload_len <= self.max_frame_size => len,
            _ => {
                dst.truncate(start);
                return Err(CodecError::FrameTooLarge {
                    size: payload_len,
                    max: self.max_frame_size,
                });
            }
        };
        dst[start..start + LENGTH_PREFIX_LEN].copy_from_slice(&declared.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BreakpointLocation, FrameNode, LoadScript, StackNode, ValueNode};

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::InitializeAck,
            Message::LoadScript(LoadScript {
                file_name: "scripts/main.lua".to_string(),
                source: String::new(),
                index: 3,
            }),
            Message::Break {
                frames: vec![StackNode::Frame(FrameNode {
                    script_index: 3,
                    function_name: "tick".to_string(),
                    line: 10,
                    children: vec![StackNode::Value(ValueNode {
                        name: "n".to_string(),
                        value: "1".to_string(),
                        type_name: "number".to_string(),
                        children: vec![],
                    })],
                })],
            },
            Message::BreakpointAck(BreakpointLocation {
                script_index: 3,
                line: 10,
            }),
        ]
    }

    fn encode_all(messages: &[Message]) -> BytesMut {
        let mut codec = AgentCodec::new();
        let mut buf = BytesMut::new();
        for message in messages {
            codec.encode(message.clone(), &mut buf).unwrap();
        }
        buf
    }

    fn decode_in_chunks(bytes: &[u8], chunk_size: usize) -> Vec<Message> {
        let mut codec = AgentCodec::new();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            buf.extend_from_slice(chunk);
            while let Some(message) = codec.decode(&mut buf).unwrap() {
                out.push(message);
            }
        }
        assert!(buf.is_empty());
        out
    }

    #[test]
    fn length_prefix_matches_payload() {
        let buf = encode_all(&[Message::Continue]);
        assert_eq!(&buf[..], &[0, 0, 0, 4, 0, 0, 0, 9]);
    }

    #[test]
    fn decode_is_independent_of_chunking() {
        let messages = sample_messages();
        let bytes = encode_all(&messages);

        let contiguous = decode_in_chunks(&bytes, bytes.len());
        assert_eq!(contiguous, messages);

        for chunk_size in [1, 2, 3, 5, 7, 13, 64] {
            assert_eq!(
                decode_in_chunks(&bytes, chunk_size),
                contiguous,
                "chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn decode_incomplete_payload_keeps_state() {
        let bytes = encode_all(&[Message::StepOver]);
        let mut codec = AgentCodec::new();
        let mut buf = BytesMut::from(&bytes[..6]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[6..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::StepOver));
    }

    #[test]
    fn decode_frame_too_large() {
        let mut codec = AgentCodec::with_max_size(16);
        let mut buf = BytesMut::from(&[0u8, 0, 1, 0][..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(
            result,
            Err(CodecError::FrameTooLarge { size: 256, max: 16 })
        ));
    }

    #[test]
    fn decode_frame_too_small() {
        let mut codec = AgentCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 2, 0, 0][..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::FrameTooSmall(2))
        ));
    }

    #[test]
    fn eof_inside_frame_is_an_error() {
        let bytes = encode_all(&[Message::StepOut]);
        let mut codec = AgentCodec::new();
        let mut buf = BytesMut::from(&bytes[..4]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(codec.decode_eof(&mut buf).is_err());
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut codec = AgentCodec::with_max_size(8);
        let mut buf = BytesMut::from(&b"keep"[..]);
        let result = codec.encode(
            Message::Text {
                level: Default::default(),
                text: "far too long for the limit".to_string(),
            },
            &mut buf,
        );
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
        assert_eq!(&buf[..], b"keep");
    }
}
