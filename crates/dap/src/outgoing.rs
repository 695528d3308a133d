//! Messages queued for the host before they are given a sequence number.
//!
//! Several tasks answer host requests (the session itself and the tasks
//! awaiting evaluation results), so sequence numbers are stamped by the single
//! writer that drains the queue, keeping them strictly increasing on the wire.

use serde_json::Value;

use crate::events::Event;
use crate::message::{self, Message, Request, Seq};

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Response(Reply),
    Event(Event),
}

/// A response to a host request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub request_seq: Seq,
    pub command: String,
    /// Body on success, error text on failure.
    pub result: Result<Option<Value>, String>,
}

impl Reply {
    pub fn ok(request: &Request, body: Option<Value>) -> Self {
        Self {
            request_seq: request.seq,
            command: request.command.clone(),
            result: Ok(body),
        }
    }

    pub fn error(request: &Request, message: impl Into<String>) -> Self {
        Self {
            request_seq: request.seq,
            command: request.command.clone(),
            result: Err(message.into()),
        }
    }

    pub fn into_response(self, seq: Seq) -> message::Response {
        let (success, message, body) = match self.result {
            Ok(body) => (true, None, body),
            Err(text) => {
                let body = serde_json::json!({ "error": { "id": 1, "format": text } });
                (false, Some(text), Some(body))
            }
        };
        message::Response {
            seq,
            request_seq: self.request_seq,
            success,
            command: self.command,
            message,
            body,
        }
    }
}

impl Outgoing {
    pub fn into_message(self, seq: Seq) -> Result<Message, serde_json::Error> {
        match self {
            Outgoing::Response(reply) => Ok(Message::Response(reply.into_response(seq))),
            Outgoing::Event(event) => event.into_message(seq),
        }
    }
}

impl From<Reply> for Outgoing {
    fn from(reply: Reply) -> Self {
        Outgoing::Response(reply)
    }
}

impl From<Event> for Outgoing {
    fn from(event: Event) -> Self {
        Outgoing::Event(event)
    }
}
