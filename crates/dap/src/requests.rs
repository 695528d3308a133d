//! Requests a host sends to the adapter.
//!
//! [`Command::parse`] turns the untyped [`Request`] envelope into a typed
//! command. Commands the adapter does not implement parse into
//! [`Command::Unsupported`] rather than failing, so the caller can answer
//! them with an error response.
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::message::Request;
use crate::types::{Source, SourceBreakpoint, SourceReference, StackFrameId, ThreadId, VariablesReference};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Initialize(InitializeArguments),
    /// Attach arguments are adapter specific and are parsed by the session.
    Attach(Value),
    ConfigurationDone,
    SetBreakpoints(SetBreakpointsArguments),
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    Source(SourceArguments),
    LoadedSources,
    Continue(ThreadArguments),
    Next(ThreadArguments),
    StepIn(ThreadArguments),
    StepOut(ThreadArguments),
    Pause(ThreadArguments),
    Evaluate(EvaluateArguments),
    Disconnect(DisconnectArguments),
    Unsupported(String),
}

impl Command {
    pub fn parse(request: &Request) -> Result<Self, serde_json::Error> {
        let command = match request.command.as_str() {
            "initialize" => Command::Initialize(args(request)?),
            "attach" => Command::Attach(
                request
                    .arguments
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            ),
            "configurationDone" => Command::ConfigurationDone,
            "setBreakpoints" => Command::SetBreakpoints(args(request)?),
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(args(request)?),
            "scopes" => Command::Scopes(args(request)?),
            "variables" => Command::Variables(args(request)?),
            "source" => Command::Source(args(request)?),
            "loadedSources" => Command::LoadedSources,
            "continue" => Command::Continue(args(request)?),
            "next" => Command::Next(args(request)?),
            "stepIn" => Command::StepIn(args(request)?),
            "stepOut" => Command::StepOut(args(request)?),
            "pause" => Command::Pause(args(request)?),
            "evaluate" => Command::Evaluate(args(request)?),
            "disconnect" => Command::Disconnect(args(request)?),
            other => Command::Unsupported(other.to_string()),
        };
        Ok(command)
    }
}

/// Deserialize the request arguments, treating absent arguments as `{}`.
fn args<T: DeserializeOwned>(request: &Request) -> Result<T, serde_json::Error> {
    match &request.arguments {
        Some(value) => T::deserialize(value),
        None => T::deserialize(&Value::Object(Default::default())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(default, rename = "clientID")]
    pub client_id: Option<String>,
    #[serde(default, rename = "adapterID")]
    pub adapter_id: Option<String>,
    #[serde(default, rename = "linesStartAt1")]
    pub lines_start_at_one: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Deprecated form of `breakpoints`, still sent by some hosts.
    #[serde(default)]
    pub lines: Option<Vec<i64>>,
}

impl SetBreakpointsArguments {
    /// Requested lines in request order.
    pub fn requested_lines(&self) -> Vec<i64> {
        match (&self.breakpoints, &self.lines) {
            (Some(bps), _) => bps.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines.clone(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: ThreadId,
    #[serde(default)]
    pub start_frame: Option<usize>,
    #[serde(default)]
    pub levels: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: StackFrameId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArguments {
    #[serde(default)]
    pub source: Option<Source>,
    pub source_reference: SourceReference,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArguments {
    #[serde(default)]
    pub thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<StackFrameId>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default)]
    pub restart: Option<bool>,
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
}
