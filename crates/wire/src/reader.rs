//! Agent message reader.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::AgentCodec;
use crate::error::CodecError;
use crate::message::Message;

pin_project! {
    /// An async stream of messages decoded from the agent socket.
    ///
    /// The stream ends (`None`) when the agent closes the connection cleanly and
    /// yields an error for anything that leaves the byte stream unaligned.
    pub struct AgentReader<R> {
        #[pin]
        inner: FramedRead<R, AgentCodec>,
    }
}

impl<R> AgentReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, AgentCodec::new())
    }

    /// Create a reader with a custom codec, e.g. a tighter frame size limit.
    pub fn with_codec(reader: R, codec: AgentCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R> Stream for AgentReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Message, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
