//! In-memory transport for testing.

use tokio::io::{DuplexStream, duplex};

use crate::transport::AgentTransport;

/// A bidirectional in-memory connection standing in for the agent socket.
///
/// ```
/// use wire::testing::MemoryTransport;
/// use wire::{AgentCodec, split};
///
/// let (adapter_side, agent_side) = MemoryTransport::pair();
/// let (adapter_reader, adapter_writer) = split(adapter_side, AgentCodec::new());
/// let (agent_reader, agent_writer) = split(agent_side, AgentCodec::new());
/// ```
pub struct MemoryTransport {
    read: DuplexStream,
    write: DuplexStream,
}

impl MemoryTransport {
    /// Create a connected pair with a 64KB buffer in each direction.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_buffer_size(64 * 1024)
    }

    pub fn pair_with_buffer_size(buffer_size: usize) -> (Self, Self) {
        let (a_to_b_write, a_to_b_read) = duplex(buffer_size);
        let (b_to_a_write, b_to_a_read) = duplex(buffer_size);

        let transport_a = MemoryTransport {
            read: b_to_a_read,
            write: a_to_b_write,
        };

        let transport_b = MemoryTransport {
            read: a_to_b_read,
            write: b_to_a_write,
        };

        (transport_a, transport_b)
    }
}

impl AgentTransport for MemoryTransport {
    type Read = DuplexStream;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.read, self.write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AgentCodec;
    use crate::message::{LoadScript, Message};
    use crate::split;
    use futures::StreamExt;

    #[tokio::test]
    async fn memory_transport_roundtrip() {
        let (adapter, agent) = MemoryTransport::pair();

        let (mut adapter_reader, mut adapter_writer) = split(adapter, AgentCodec::new());
        let (mut agent_reader, mut agent_writer) = split(agent, AgentCodec::new());

        adapter_writer.send(Message::LoadDone).await.unwrap();
        assert_eq!(
            agent_reader.next().await.unwrap().unwrap(),
            Message::LoadDone
        );

        let load = Message::LoadScript(LoadScript {
            file_name: "main.lua".to_string(),
            source: String::new(),
            index: 0,
        });
        agent_writer.send(load.clone()).await.unwrap();
        assert_eq!(adapter_reader.next().await.unwrap().unwrap(), load);
    }

    #[tokio::test]
    async fn memory_transport_close_signals_eof() {
        let (adapter, agent) = MemoryTransport::pair();

        let (_adapter_reader, adapter_writer) = split(adapter, AgentCodec::new());
        let (mut agent_reader, _agent_writer) = split(agent, AgentCodec::new());

        drop(adapter_writer);

        assert!(agent_reader.next().await.is_none());
    }
}
