//! Adapter side of the Debug Adapter Protocol.
//!
//! - [`DapCodec`] frames [`Message`]s with a `Content-Length` header
//! - [`requests::Command`] is the typed view of an incoming [`Request`]
//! - [`responses`] and [`events`] hold the typed bodies the adapter sends back
//! - [`Outgoing`] queues replies and events until the writer stamps a `seq`
//!
//! Session logic lives in the `debugger` crate; this crate only knows the
//! shape of the host protocol.

mod codec;
mod error;
mod message;
mod outgoing;

pub mod events;
pub mod requests;
pub mod responses;
pub mod testing;
pub mod types;

pub use codec::DapCodec;
pub use error::CodecError;
pub use message::{Event, Message, Request, Response, Seq};
pub use outgoing::{Outgoing, Reply};

use tokio::io::{Stdin, Stdout};
use tokio_util::codec::{FramedRead, FramedWrite};

pub type HostReader<R> = FramedRead<R, DapCodec>;
pub type HostWriter<W> = FramedWrite<W, DapCodec>;

/// Reader and writer over the process's standard streams.
pub fn stdio() -> (HostReader<Stdin>, HostWriter<Stdout>) {
    (
        FramedRead::new(tokio::io::stdin(), DapCodec::new()),
        FramedWrite::new(tokio::io::stdout(), DapCodec::new()),
    )
}
