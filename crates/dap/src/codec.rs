//! Content-Length framing for host protocol messages.
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <JSON body>
//! ```
//!
//! Other headers are tolerated and ignored; header names are matched case
//! insensitively.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::Message;

/// Default maximum message size (16 MB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone)]
pub struct DapCodec {
    max_message_size: usize,
    /// Body length parsed from a header block whose body has not fully arrived.
    pending_body: Option<usize>,
}

impl DapCodec {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            pending_body: None,
        }
    }
}

impl Default for DapCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DapCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let body_len = match self.pending_body {
            Some(len) => len,
            None => {
                let Some(header_end) = src
                    .windows(HEADER_TERMINATOR.len())
                    .position(|w| w == HEADER_TERMINATOR)
                else {
                    return Ok(None);
                };
                let len = parse_content_length(&src[..header_end])?;
                if len > self.max_message_size {
                    return Err(CodecError::MessageTooLarge {
                        size: len,
                        max: self.max_message_size,
                    });
                }
                src.advance(header_end + HEADER_TERMINATOR.len());
                self.pending_body = Some(len);
                len
            }
        };

        if src.len() < body_len {
            src.reserve(body_len - src.len());
            return Ok(None);
        }

        let body = src.split_to(body_len);
        self.pending_body = None;
        let message = serde_json::from_slice(&body).map_err(CodecError::JsonDeserialize)?;
        tracing::trace!(len = body_len, "decoded host message");
        Ok(Some(message))
    }
}

impl Encoder<Message> for DapCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(CodecError::JsonSerialize)?;

        let header = format!("Content-Length: {}\r\n\r\n", json.len());
        dst.reserve(header.len() + json.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&json);

        Ok(())
    }
}

fn parse_content_length(header: &[u8]) -> Result<usize, CodecError> {
    let header = std::str::from_utf8(header).map_err(|_| CodecError::InvalidUtf8)?;

    header
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| {
            value
                .trim()
                .parse()
                .map_err(|_| CodecError::MalformedContentLength(value.trim().to_string()))
        })
        .unwrap_or(Err(CodecError::MissingContentLength))
}
