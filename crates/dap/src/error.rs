//! Error types for the host protocol transport.

use std::io;

/// Errors that can occur while framing or parsing host protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header section contained invalid UTF-8.
    #[error("invalid UTF-8 in header")]
    InvalidUtf8,

    /// The Content-Length header value could not be parsed as an integer.
    #[error("malformed Content-Length header value {0:?}")]
    MalformedContentLength(String),

    /// A header block ended without a Content-Length header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The message body exceeds the configured maximum size.
    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to deserialize the JSON message body.
    #[error("JSON deserialization failed: {0}")]
    JsonDeserialize(#[source] serde_json::Error),

    /// Failed to serialize the outgoing message to JSON.
    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[source] serde_json::Error),
}
