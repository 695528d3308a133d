//! Testing utilities for code that talks to the agent.

mod memory;

pub use memory::MemoryTransport;

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::AgentCodec;
use crate::message::Message;

/// Encode a single message as a complete frame, length prefix included.
pub fn frame_message(message: &Message) -> Vec<u8> {
    frame_messages(std::slice::from_ref(message))
}

/// Encode several messages back to back, as they would appear on the socket.
pub fn frame_messages(messages: &[Message]) -> Vec<u8> {
    let mut codec = AgentCodec::new();
    let mut buf = BytesMut::new();
    for message in messages {
        codec
            .encode(message.clone(), &mut buf)
            .expect("failed to encode message");
    }
    buf.to_vec()
}
