//! Error types for the agent wire protocol.

use std::io;

/// Errors that can occur while framing, encoding or decoding agent messages.
///
/// Every decode error is fatal for the connection: once a frame cannot be
/// interpreted the byte stream can no longer be trusted to be aligned.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The declared frame length exceeds the configured maximum.
    #[error("frame size {size} exceeds maximum allowed {max}")]
    FrameTooLarge {
        /// The declared frame size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// The declared frame length cannot hold a message kind id.
    #[error("frame size {0} is too small to carry a message kind")]
    FrameTooSmall(usize),

    /// A field ran past the end of the frame payload.
    #[error("truncated {field}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// The field being read.
        field: &'static str,
        /// Bytes required to read the field.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// A known message left unread bytes in its frame.
    #[error("{remaining} trailing bytes after {kind} message")]
    TrailingBytes {
        /// Name of the message kind that was decoded.
        kind: &'static str,
        /// Number of bytes left unread.
        remaining: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// The field being read.
        field: &'static str,
    },

    /// A stack node carried a discriminant this codec does not understand.
    #[error("unknown stack node discriminant {0}")]
    UnknownNode(u8),

    /// A stack tree nested deeper than the codec allows.
    #[error("stack tree nested deeper than {0} levels")]
    TreeTooDeep(usize),

    /// A payload or string is too long to describe with a 32-bit length.
    #[error("{field} length {len} does not fit in a u32 length prefix")]
    LengthOverflow {
        /// The field being written.
        field: &'static str,
        /// The offending length.
        len: usize,
    },
}
