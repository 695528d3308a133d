//! The closed catalog of messages exchanged with the attach agent.
//!
//! A frame payload starts with a big-endian `u32` message kind id followed by
//! kind specific fields. Decoding dispatches on that id; ids this crate does not
//! know decode to [`Message::Unknown`] so a newer agent cannot break an older
//! adapter.

use bytes::{Buf, BufMut};

use crate::buf::{get_bool, get_i32, get_string, get_u8, get_u32, put_bool, put_string};
use crate::error::CodecError;

/// The agent's own numbering of a loaded script.
pub type ScriptIndex = i32;

/// Correlation id of an evaluation request.
pub type EvalId = u32;

/// Stack trees deeper than this are rejected rather than recursed into.
pub const MAX_TREE_DEPTH: usize = 64;

/// Numeric message kind ids as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    Initialize = 0,
    InitializeAck = 1,
    Text = 2,
    LoadScript = 3,
    LoadDone = 4,
    AddBreakpoint = 5,
    RemoveBreakpoint = 6,
    BreakpointAck = 7,
    Break = 8,
    Continue = 9,
    StepOver = 10,
    StepInto = 11,
    StepOut = 12,
    Pause = 13,
    EvaluateRequest = 14,
    EvaluateResponse = 15,
}

impl MessageKind {
    pub fn from_id(id: u32) -> Option<Self> {
        let kind = match id {
            0 => Self::Initialize,
            1 => Self::InitializeAck,
            2 => Self::Text,
            3 => Self::LoadScript,
            4 => Self::LoadDone,
            5 => Self::AddBreakpoint,
            6 => Self::RemoveBreakpoint,
            7 => Self::BreakpointAck,
            8 => Self::Break,
            9 => Self::Continue,
            10 => Self::StepOver,
            11 => Self::StepInto,
            12 => Self::StepOut,
            13 => Self::Pause,
            14 => Self::EvaluateRequest,
            15 => Self::EvaluateResponse,
            _ => return None,
        };
        Some(kind)
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize",
            Self::InitializeAck => "InitializeAck",
            Self::Text => "Text",
            Self::LoadScript => "LoadScript",
            Self::LoadDone => "LoadDone",
            Self::AddBreakpoint => "AddBreakpoint",
            Self::RemoveBreakpoint => "RemoveBreakpoint",
            Self::BreakpointAck => "BreakpointAck",
            Self::Break => "Break",
            Self::Continue => "Continue",
            Self::StepOver => "StepOver",
            Self::StepInto => "StepInto",
            Self::StepOut => "StepOut",
            Self::Pause => "Pause",
            Self::EvaluateRequest => "EvaluateRequest",
            Self::EvaluateResponse => "EvaluateResponse",
        }
    }
}

/// Severity attached to free-form agent text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl TextLevel {
    fn from_wire(value: u32) -> Self {
        match value {
            1 => Self::Warning,
            2 => Self::Error,
            _ => Self::Info,
        }
    }

    fn to_wire(self) -> u32 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
        }
    }
}

/// Handshake sent once the socket connects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Initialize {
    /// Directory the agent may search for debug symbols; empty when unused.
    pub symbol_path: String,
    /// Location of the script the agent injects into the target runtime.
    pub helper_script: String,
    pub capture_stdout: bool,
    pub capture_debug_output: bool,
}

/// A script the target runtime has just loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadScript {
    /// Path as the runtime reports it; may be relative or chunk-prefixed.
    pub file_name: String,
    /// Script text, empty when the agent did not ship it.
    pub source: String,
    pub index: ScriptIndex,
}

impl LoadScript {
    /// The shipped script text, if any.
    pub fn source_text(&self) -> Option<&str> {
        (!self.source.is_empty()).then_some(self.source.as_str())
    }
}

/// A line within a script, addressed by runtime index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointLocation {
    pub script_index: ScriptIndex,
    pub line: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateRequest {
    pub eval_id: EvalId,
    /// Zero based depth into the stack of the last stop, innermost first.
    pub stack_level: i32,
    /// How many levels of children the agent should expand in the result.
    pub depth: i32,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateResponse {
    pub eval_id: EvalId,
    /// The evaluated value, or the agent's error text.
    pub result: Result<StackNode, String>,
}

/// A call frame reported in a break event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNode {
    pub script_index: ScriptIndex,
    pub function_name: String,
    pub line: i32,
    pub children: Vec<StackNode>,
}

/// A named value (local, upvalue, table field) and its nested members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueNode {
    pub name: String,
    pub value: String,
    pub type_name: String,
    pub children: Vec<StackNode>,
}

/// A node of the stack tree carried by [`Message::Break`].
///
/// Root nodes are normally [`StackNode::Frame`]s whose children are
/// [`StackNode::Value`]s; containers only group other nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackNode {
    Container { children: Vec<StackNode> },
    Frame(FrameNode),
    Value(ValueNode),
}

const NODE_CONTAINER: u8 = 0;
const NODE_FRAME: u8 = 1;
const NODE_VALUE: u8 = 2;

impl StackNode {
    pub fn children(&self) -> &[StackNode] {
        match self {
            StackNode::Container { children } => children,
            StackNode::Frame(frame) => &frame.children,
            StackNode::Value(value) => &value.children,
        }
    }

    fn decode(src: &mut impl Buf, depth: usize) -> Result<Self, CodecError> {
        if depth >= MAX_TREE_DEPTH {
            return Err(CodecError::TreeTooDeep(MAX_TREE_DEPTH));
        }

        let discriminant = get_u8(src, "node discriminant")?;
        let node = match discriminant {
            NODE_CONTAINER => StackNode::Container {
                children: decode_children(src, depth)?,
            },
            NODE_FRAME => {
                let script_index = get_i32(src, "frame script index")?;
                let function_name = get_string(src, "frame function name")?;
                let line = get_i32(src, "frame line")?;
                StackNode::Frame(FrameNode {
                    script_index,
                    function_name,
                    line,
                    children: decode_children(src, depth)?,
                })
            }
            NODE_VALUE => {
                let name = get_string(src, "value name")?;
                let value = get_string(src, "value text")?;
                let type_name = get_string(src, "value type")?;
                StackNode::Value(ValueNode {
                    name,
                    value,
                    type_name,
                    children: decode_children(src, depth)?,
                })
            }
            other => return Err(CodecError::UnknownNode(other)),
        };
        Ok(node)
    }

    fn encode(&self, dst: &mut impl BufMut) -> Result<(), CodecError> {
        match self {
            StackNode::Container { .. } => dst.put_u8(NODE_CONTAINER),
            StackNode::Frame(frame) => {
                dst.put_u8(NODE_FRAME);
                dst.put_i32(frame.script_index);
                put_string(dst, "frame function name", &frame.function_name)?;
                dst.put_i32(frame.line);
            }
            StackNode::Value(value) => {
                dst.put_u8(NODE_VALUE);
                put_string(dst, "value name", &value.name)?;
                put_string(dst, "value text", &value.value)?;
                put_string(dst, "value type", &value.type_name)?;
            }
        }
        encode_nodes(dst, "node children", self.children())
    }
}

/// Children counts precede the children themselves.
fn decode_children(src: &mut impl Buf, depth: usize) -> Result<Vec<StackNode>, CodecError> {
    let count = get_u32(src, "child count")? as usize;
    // Every node is at least a discriminant plus a child count, so a count
    // that cannot fit in the remaining payload is rejected before allocating.
    crate::buf::ensure(&*src, "children", count.saturating_mul(5))?;
    let mut children = Vec::with_capacity(count);
    for _ in 0..count {
        children.push(StackNode::decode(src, depth + 1)?);
    }
    Ok(children)
}

fn encode_nodes(
    dst: &mut impl BufMut,
    field: &'static str,
    nodes: &[StackNode],
) -> Result<(), CodecError> {
    let count = u32::try_from(nodes.len()).map_err(|_| CodecError::LengthOverflow {
        field,
        len: nodes.len(),
    })?;
    dst.put_u32(count);
    for node in nodes {
        node.encode(dst)?;
    }
    Ok(())
}

/// A decoded agent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Initialize(Initialize),
    InitializeAck,
    Text { level: TextLevel, text: String },
    LoadScript(LoadScript),
    LoadDone,
    AddBreakpoint(BreakpointLocation),
    RemoveBreakpoint(BreakpointLocation),
    BreakpointAck(BreakpointLocation),
    /// The target stopped; root nodes are the call stack, innermost first.
    Break { frames: Vec<StackNode> },
    Continue,
    StepOver,
    StepInto,
    StepOut,
    Pause,
    EvaluateRequest(EvaluateRequest),
    EvaluateResponse(EvaluateResponse),
    /// A kind id this crate does not know. Only the id survives decoding.
    Unknown { kind: u32 },
}

impl Message {
    /// The numeric kind id written at the start of the payload.
    pub fn kind_id(&self) -> u32 {
        match self.known_kind() {
            Ok(kind) => kind.id(),
            Err(id) => id,
        }
    }

    pub fn kind(&self) -> Option<MessageKind> {
        self.known_kind().ok()
    }

    fn known_kind(&self) -> Result<MessageKind, u32> {
        let kind = match self {
            Message::Initialize(_) => MessageKind::Initialize,
            Message::InitializeAck => MessageKind::InitializeAck,
            Message::Text { .. } => MessageKind::Text,
            Message::LoadScript(_) => MessageKind::LoadScript,
            Message::LoadDone => MessageKind::LoadDone,
            Message::AddBreakpoint(_) => MessageKind::AddBreakpoint,
            Message::RemoveBreakpoint(_) => MessageKind::RemoveBreakpoint,
            Message::BreakpointAck(_) => MessageKind::BreakpointAck,
            Message::Break { .. } => MessageKind::Break,
            Message::Continue => MessageKind::Continue,
            Message::StepOver => MessageKind::StepOver,
            Message::StepInto => MessageKind::StepInto,
            Message::StepOut => MessageKind::StepOut,
            Message::Pause => MessageKind::Pause,
            Message::EvaluateRequest(_) => MessageKind::EvaluateRequest,
            Message::EvaluateResponse(_) => MessageKind::EvaluateResponse,
            Message::Unknown { kind } => return Err(*kind),
        };
        Ok(kind)
    }

    /// Decode one complete frame payload (length prefix already stripped).
    pub fn decode(mut src: impl Buf) -> Result<Self, CodecError> {
        let id = get_u32(&mut src, "message kind")?;
        let Some(kind) = MessageKind::from_id(id) else {
            tracing::warn!(
                kind = id,
                skipped = src.remaining(),
                "unrecognised agent message kind"
            );
            src.advance(src.remaining());
            return Ok(Message::Unknown { kind: id });
        };

        let message = match kind {
            MessageKind::Initialize => Message::Initialize(Initialize {
                symbol_path: get_string(&mut src, "symbol path")?,
                helper_script: get_string(&mut src, "helper script")?,
                capture_stdout: get_bool(&mut src, "capture stdout")?,
                capture_debug_output: get_bool(&mut src, "capture debug output")?,
            }),
            MessageKind::InitializeAck => Message::InitializeAck,
            MessageKind::Text => Message::Text {
                level: TextLevel::from_wire(get_u32(&mut src, "text level")?),
                text: get_string(&mut src, "text")?,
            },
            MessageKind::LoadScript => {
                let file_name = get_string(&mut src, "script file name")?;
                let source = get_string(&mut src, "script source")?;
                let index = get_i32(&mut src, "script index")?;
                Message::LoadScript(LoadScript {
                    file_name,
                    source,
                    index,
                })
            }
            MessageKind::LoadDone => Message::LoadDone,
            MessageKind::AddBreakpoint => Message::AddBreakpoint(decode_location(&mut src)?),
            MessageKind::RemoveBreakpoint => Message::RemoveBreakpoint(decode_location(&mut src)?),
            MessageKind::BreakpointAck => Message::BreakpointAck(decode_location(&mut src)?),
            MessageKind::Break => Message::Break {
                frames: decode_children(&mut src, 0)?,
            },
            MessageKind::Continue => Message::Continue,
            MessageKind::StepOver => Message::StepOver,
            MessageKind::StepInto => Message::StepInto,
            MessageKind::StepOut => Message::StepOut,
            MessageKind::Pause => Message::Pause,
            MessageKind::EvaluateRequest => Message::EvaluateRequest(EvaluateRequest {
                eval_id: get_u32(&mut src, "eval id")?,
                stack_level: get_i32(&mut src, "stack level")?,
                depth: get_i32(&mut src, "eval depth")?,
                expression: get_string(&mut src, "expression")?,
            }),
            MessageKind::EvaluateResponse => {
                let eval_id = get_u32(&mut src, "eval id")?;
                let result = if get_bool(&mut src, "eval success")? {
                    Ok(StackNode::decode(&mut src, 0)?)
                } else {
                    Err(get_string(&mut src, "eval error")?)
                };
                Message::EvaluateResponse(EvaluateResponse { eval_id, result })
            }
        };

        if src.has_remaining() {
            return Err(CodecError::TrailingBytes {
                kind: kind.name(),
                remaining: src.remaining(),
            });
        }
        Ok(message)
    }

    /// Encode the payload (kind id and fields) without the length prefix.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), CodecError> {
        dst.put_u32(self.kind_id());
        match self {
            Message::Initialize(init) => {
                put_string(dst, "symbol path", &init.symbol_path)?;
                put_string(dst, "helper script", &init.helper_script)?;
                put_bool(dst, init.capture_stdout);
                put_bool(dst, init.capture_debug_output);
            }
            Message::Text { level, text } => {
                dst.put_u32(level.to_wire());
                put_string(dst, "text", text)?;
            }
            Message::LoadScript(script) => {
                put_string(dst, "script file name", &script.file_name)?;
                put_string(dst, "script source", &script.source)?;
                dst.put_i32(script.index);
            }
            Message::AddBreakpoint(location)
            | Message::RemoveBreakpoint(location)
            | Message::BreakpointAck(location) => {
                dst.put_i32(location.script_index);
                dst.put_i32(location.line);
            }
            Message::Break { frames } => encode_nodes(dst, "break frames", frames)?,
            Message::EvaluateRequest(request) => {
                dst.put_u32(request.eval_id);
                dst.put_i32(request.stack_level);
                dst.put_i32(request.depth);
                put_string(dst, "expression", &request.expression)?;
            }
            Message::EvaluateResponse(response) => {
                dst.put_u32(response.eval_id);
                match &response.result {
                    Ok(node) => {
                        put_bool(dst, true);
                        node.encode(dst)?;
                    }
                    Err(error) => {
                        put_bool(dst, false);
                        put_string(dst, "eval error", error)?;
                    }
                }
            }
            Message::InitializeAck
            | Message::LoadDone
            | Message::Continue
            | Message::StepOver
            | Message::StepInto
            | Message::StepOut
            | Message::Pause
            | Message::Unknown { .. } => {}
        }
        Ok(())
    }
}

fn decode_location(src: &mut impl Buf) -> Result<BreakpointLocation, CodecError> {
    Ok(BreakpointLocation {
        script_index: get_i32(src, "breakpoint script index")?,
        line: get_i32(src, "breakpoint line")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encoded(message: &Message) -> BytesMut {
        let mut buf = BytesMut::new();
        message.encode(&mut buf).unwrap();
        buf
    }

    fn sample_stack() -> Vec<StackNode> {
        vec![
            StackNode::Frame(FrameNode {
                script_index: 3,
                function_name: "update".to_string(),
                line: 12,
                children: vec![
                    StackNode::Value(ValueNode {
                        name: "dt".to_string(),
                        value: "0.016".to_string(),
                        type_name: "number".to_string(),
                        children: vec![],
                    }),
                    StackNode::Value(ValueNode {
                        name: "self".to_string(),
                        value: "table: 0x1234".to_string(),
                        type_name: "table".to_string(),
                        children: vec![StackNode::Value(ValueNode {
                            name: "hp".to_string(),
                            value: "10".to_string(),
                            type_name: "number".to_string(),
                            children: vec![],
                        })],
                    }),
                ],
            }),
            StackNode::Frame(FrameNode {
                script_index: 1,
                function_name: "main".to_string(),
                line: 40,
                children: vec![],
            }),
        ]
    }

    #[test]
    fn kind_id_is_big_endian_prefix() {
        let buf = encoded(&Message::LoadDone);
        assert_eq!(&buf[..], &[0, 0, 0, 4]);
    }

    #[test]
    fn add_breakpoint_layout() {
        let buf = encoded(&Message::AddBreakpoint(BreakpointLocation {
            script_index: 3,
            line: 10,
        }));
        assert_eq!(&buf[..], &[0, 0, 0, 5, 0, 0, 0, 3, 0, 0, 0, 10]);
    }

    #[test]
    fn every_kind_survives_decode_then_encode() {
        let messages = vec![
            Message::Initialize(Initialize {
                symbol_path: String::new(),
                helper_script: "/ext/server/Emmy.lua".to_string(),
                capture_stdout: true,
                capture_debug_output: true,
            }),
            Message::InitializeAck,
            Message::Text {
                level: TextLevel::Warning,
                text: "hello".to_string(),
            },
            Message::LoadScript(LoadScript {
                file_name: "scripts/main.lua".to_string(),
                source: "print(1)".to_string(),
                index: 3,
            }),
            Message::LoadScript(LoadScript {
                file_name: "@chunk".to_string(),
                source: String::new(),
                index: -1,
            }),
            Message::LoadDone,
            Message::AddBreakpoint(BreakpointLocation {
                script_index: 3,
                line: 40,
            }),
            Message::RemoveBreakpoint(BreakpointLocation {
                script_index: 1,
                line: 2,
            }),
            Message::BreakpointAck(BreakpointLocation {
                script_index: 1,
                line: 2,
            }),
            Message::Break {
                frames: sample_stack(),
            },
            Message::Continue,
            Message::StepOver,
            Message::StepInto,
            Message::StepOut,
            Message::Pause,
            Message::EvaluateRequest(EvaluateRequest {
                eval_id: 7,
                stack_level: 0,
                depth: 1,
                expression: "self.hp".to_string(),
            }),
            Message::EvaluateResponse(EvaluateResponse {
                eval_id: 7,
                result: Err("attempt to index a nil value".to_string()),
            }),
            Message::EvaluateResponse(EvaluateResponse {
                eval_id: 8,
                result: Ok(StackNode::Value(ValueNode {
                    name: "t".to_string(),
                    value: "table: 0x1".to_string(),
                    type_name: "table".to_string(),
                    children: vec![StackNode::Value(ValueNode {
                        name: "n".to_string(),
                        value: "2".to_string(),
                        type_name: "number".to_string(),
                        children: vec![],
                    })],
                })),
            }),
        ];

        for message in messages {
            let bytes = encoded(&message).freeze();
            let decoded = Message::decode(bytes.clone()).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(encoded(&decoded).freeze(), bytes);
        }
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        let payload: &[u8] = &[0, 0, 0, 99, 1, 2, 3];
        let message = Message::decode(payload).unwrap();
        assert_eq!(message, Message::Unknown { kind: 99 });
        assert_eq!(&encoded(&message)[..], &[0, 0, 0, 99]);
    }

    #[test]
    fn trailing_bytes_after_known_kind_fail() {
        let payload: &[u8] = &[0, 0, 0, 1, 0xaa];
        assert!(matches!(
            Message::decode(payload),
            Err(CodecError::TrailingBytes {
                kind: "InitializeAck",
                remaining: 1
            })
        ));
    }

    #[test]
    fn unknown_node_discriminant_fails() {
        // Break with one node carrying discriminant 9
        let payload: &[u8] = &[0, 0, 0, 8, 0, 0, 0, 1, 9, 0, 0, 0, 0];
        assert!(matches!(
            Message::decode(payload),
            Err(CodecError::UnknownNode(9))
        ));
    }

    #[test]
    fn absurd_child_count_is_rejected_before_allocating() {
        let payload: &[u8] = &[0, 0, 0, 8, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            Message::decode(payload),
            Err(CodecError::Truncated {
                field: "children",
                ..
            })
        ));
    }

    #[test]
    fn deep_trees_are_rejected() {
        let mut node = StackNode::Container { children: vec![] };
        for _ in 0..MAX_TREE_DEPTH + 1 {
            node = StackNode::Container {
                children: vec![node],
            };
        }
        let bytes = encoded(&Message::Break {
            frames: vec![node],
        })
        .freeze();
        assert!(matches!(
            Message::decode(bytes),
            Err(CodecError::TreeTooDeep(MAX_TREE_DEPTH))
        ));
    }

    #[test]
    fn empty_source_reads_as_not_shipped() {
        let bytes = encoded(&Message::LoadScript(LoadScript {
            file_name: "a.lua".to_string(),
            source: String::new(),
            index: 0,
        }))
        .freeze();
        let Message::LoadScript(script) = Message::decode(bytes).unwrap() else {
            panic!("expected LoadScript");
        };
        assert_eq!(script.source_text(), None);

        let shipped = LoadScript {
            source: "return 1".to_string(),
            ..script
        };
        assert_eq!(shipped.source_text(), Some("return 1"));
    }
}
