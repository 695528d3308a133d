//! Binary wire protocol spoken with the attach agent.
//!
//! The agent is a helper injected into the target script runtime. It listens on
//! a TCP port and exchanges length-prefixed binary frames with the adapter:
//!
//! - [`AgentCodec`] implements tokio-util's `Encoder`/`Decoder` for frames
//! - [`Message`] is the closed catalog of message kinds, including the
//!   recursive [`StackNode`] tree carried by break events
//! - [`AgentReader`] / [`AgentWriter`] wrap the two halves of a socket
//!
//! All integers are big-endian. Correlating evaluations, tracking scripts and
//! mapping breakpoints belong to the `debugger` crate.

mod buf;
mod codec;
mod error;
mod message;
mod reader;
mod transport;
mod writer;

pub mod testing;

pub use codec::{AgentCodec, DEFAULT_MAX_FRAME_SIZE};
pub use error::CodecError;
pub use message::{
    BreakpointLocation, EvalId, EvaluateRequest, EvaluateResponse, FrameNode, Initialize,
    LoadScript, MAX_TREE_DEPTH, Message, MessageKind, ScriptIndex, StackNode, TextLevel,
    ValueNode,
};
pub use reader::AgentReader;
pub use transport::{AgentTransport, split};
pub use writer::AgentWriter;

use std::io;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Connect to an agent and return a reader/writer pair.
pub async fn connect(
    addr: impl ToSocketAddrs,
    codec: AgentCodec,
) -> io::Result<(
    AgentReader<tokio::net::tcp::OwnedReadHalf>,
    AgentWriter<tokio::net::tcp::OwnedWriteHalf>,
)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(split(stream, codec))
}
