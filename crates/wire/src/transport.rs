//! Splitting byte streams into agent reader/writer pairs.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::codec::AgentCodec;
use crate::reader::AgentReader;
use crate::writer::AgentWriter;

/// A byte stream that can be split into independently owned halves.
///
/// Implemented for [`TcpStream`], which is how the agent is reached in
/// practice, and for [`crate::testing::MemoryTransport`] in tests.
pub trait AgentTransport: Send + 'static {
    type Read: AsyncRead + Unpin + Send + 'static;
    type Write: AsyncWrite + Unpin + Send + 'static;

    fn into_split(self) -> (Self::Read, Self::Write);
}

impl AgentTransport for TcpStream {
    type Read = OwnedReadHalf;
    type Write = OwnedWriteHalf;

    fn into_split(self) -> (Self::Read, Self::Write) {
        TcpStream::into_split(self)
    }
}

/// Split a transport into an agent reader and writer sharing `codec` settings.
pub fn split<T: AgentTransport>(
    transport: T,
    codec: AgentCodec,
) -> (AgentReader<T::Read>, AgentWriter<T::Write>) {
    let (read, write) = transport.into_split();
    (
        AgentReader::with_codec(read, codec.clone()),
        AgentWriter::with_codec(write, codec),
    )
}
