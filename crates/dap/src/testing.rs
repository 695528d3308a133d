//! Helpers for driving an adapter from tests.
use serde_json::Value;

use crate::message::{Message, Request, Seq};

/// Encode a message with its Content-Length header.
pub fn frame(message: &Message) -> Vec<u8> {
    let body = serde_json::to_vec(message).unwrap_or_default();
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    out
}

/// Build a request envelope.
pub fn request(seq: Seq, command: &str, arguments: Option<Value>) -> Message {
    Message::Request(Request {
        seq,
        command: command.to_string(),
        arguments,
    })
}
