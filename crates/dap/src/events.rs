//! Events emitted by the adapter.
use serde::Serialize;

use crate::message::{self, Seq};
use crate::types::{Breakpoint, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Initialized,
    Output(OutputEventBody),
    Stopped(StoppedEventBody),
    Breakpoint(BreakpointEventBody),
    Terminated,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialized => "initialized",
            Event::Output(_) => "output",
            Event::Stopped(_) => "stopped",
            Event::Breakpoint(_) => "breakpoint",
            Event::Terminated => "terminated",
        }
    }

    /// Wrap the event in a protocol envelope.
    pub fn into_message(self, seq: Seq) -> Result<message::Message, serde_json::Error> {
        let event = self.name().to_string();
        let body = match self {
            Event::Initialized | Event::Terminated => None,
            Event::Output(body) => Some(serde_json::to_value(body)?),
            Event::Stopped(body) => Some(serde_json::to_value(body)?),
            Event::Breakpoint(body) => Some(serde_json::to_value(body)?),
        };
        Ok(message::Message::Event(message::Event { seq, event, body }))
    }

    pub fn output(category: OutputCategory, output: impl Into<String>) -> Self {
        Event::Output(OutputEventBody {
            category,
            output: output.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    pub category: OutputCategory,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: String,
    pub thread_id: ThreadId,
    pub all_threads_stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    pub reason: String,
    pub breakpoint: Breakpoint,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stopped_event_envelope() {
        let event = Event::Stopped(StoppedEventBody {
            reason: "breakpoint".to_string(),
            thread_id: 1,
            all_threads_stopped: true,
        });

        let msg = serde_json::to_value(event.into_message(7).unwrap()).unwrap();
        assert_eq!(
            msg,
            json!({
                "seq": 7,
                "type": "event",
                "event": "stopped",
                "body": { "reason": "breakpoint", "threadId": 1, "allThreadsStopped": true }
            })
        );
    }

    #[test]
    fn terminated_has_no_body() {
        let msg = serde_json::to_value(Event::Terminated.into_message(1).unwrap()).unwrap();
        assert_eq!(msg["event"], "terminated");
        assert!(msg.get("body").is_none());
    }
}
