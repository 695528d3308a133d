//! Protocol envelopes.
//!
//! The adapter receives [`Request`]s from the host and answers with
//! [`Response`]s and unsolicited [`Event`]s. All three share the `seq` and
//! `type` fields, so they are modelled as one internally tagged enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number type for message ordering and request-response correlation.
pub type Seq = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: Seq,
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    /// Short error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: Seq,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_request_without_arguments() {
        let json = r#"{"seq": 3, "type": "request", "command": "threads"}"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, Message::Request(r) if r.command == "threads" && r.arguments.is_none()));
    }

    #[test]
    fn response_uses_snake_case_request_seq() {
        let msg = Message::Response(Response {
            seq: 9,
            request_seq: 4,
            success: true,
            command: "threads".to_string(),
            message: None,
            body: None,
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "response");
        assert_eq!(json["request_seq"], 4);
        assert!(json.get("message").is_none());
    }
}
