//! Bodies of successful responses sent back to the host.
use serde::Serialize;
use serde_json::Value;

use crate::types::{Breakpoint, Scope, Source, StackFrame, Thread, Variable, VariablesReference};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Initialize(Capabilities),
    SetBreakpoints(SetBreakpointsResponse),
    Threads(ThreadsResponse),
    StackTrace(StackTraceResponse),
    Scopes(ScopesResponse),
    Variables(VariablesResponse),
    Source(SourceResponse),
    LoadedSources(LoadedSourcesResponse),
    Continue(ContinueResponse),
    Evaluate(EvaluateResponse),
}

impl ResponseBody {
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_loaded_sources_request: bool,
    pub supports_delayed_stack_trace_loading: bool,
    pub supports_terminate_request: bool,
    pub supports_conditional_breakpoints: bool,
}

impl Capabilities {
    /// What this adapter can do.
    pub fn adapter() -> Self {
        Self {
            supports_configuration_done_request: true,
            supports_evaluate_for_hovers: true,
            supports_loaded_sources_request: true,
            supports_delayed_stack_trace_loading: true,
            supports_terminate_request: false,
            supports_conditional_breakpoints: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponse {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponse {
    pub stack_frames: Vec<StackFrame>,
    pub total_frames: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedSourcesResponse {
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponse {
    pub all_threads_continued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub result: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    pub variables_reference: VariablesReference,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn untagged_body_serializes_inner_struct() {
        let body = ResponseBody::StackTrace(StackTraceResponse {
            stack_frames: vec![StackFrame {
                id: 1,
                name: "main".to_string(),
                source: None,
                line: 12,
                column: 0,
            }],
            total_frames: 1,
        });

        assert_eq!(
            body.to_value().unwrap(),
            json!({
                "stackFrames": [{ "id": 1, "name": "main", "line": 12, "column": 0 }],
                "totalFrames": 1
            })
        );
    }

    #[test]
    fn capabilities_advertise_configuration_done() {
        let json = serde_json::to_value(Capabilities::adapter()).unwrap();
        assert_eq!(json["supportsConfigurationDoneRequest"], true);
        assert_eq!(json["supportsLoadedSourcesRequest"], true);
    }
}
