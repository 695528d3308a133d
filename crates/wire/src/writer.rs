//! Agent message writer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::AgentCodec;
use crate::error::CodecError;
use crate::message::Message;

pin_project! {
    /// An async sink that frames messages for the agent socket.
    ///
    /// Each message is written as one logical frame: the length prefix and the
    /// payload are produced into the same buffer before being flushed.
    pub struct AgentWriter<W> {
        #[pin]
        inner: FramedWrite<W, AgentCodec>,
    }
}

impl<W> AgentWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self::with_codec(writer, AgentCodec::new())
    }

    pub fn with_codec(writer: W, codec: AgentCodec) -> Self {
        Self {
            inner: FramedWrite::new(writer, codec),
        }
    }

    /// Feed, flush and await a single message.
    pub async fn send(&mut self, msg: Message) -> Result<(), CodecError> {
        use futures::SinkExt;
        SinkExt::send(&mut self.inner, msg).await
    }

    /// The underlying writer, for writing bytes that bypass the codec.
    pub fn get_mut(&mut self) -> &mut W {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<Message> for AgentWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::BreakpointLocation;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_frames_back_to_back() {
        let mut writer = AgentWriter::new(Cursor::new(Vec::new()));

        writer.send(Message::LoadDone).await.unwrap();
        writer
            .send(Message::AddBreakpoint(BreakpointLocation {
                script_index: 3,
                line: 20,
            }))
            .await
            .unwrap();

        let output = writer.into_inner().into_inner();
        assert_eq!(
            output,
            vec![
                0, 0, 0, 4, 0, 0, 0, 4, // LoadDone
                0, 0, 0, 12, 0, 0, 0, 5, 0, 0, 0, 3, 0, 0, 0, 20, // AddBreakpoint
            ]
        );
    }
}
