//! The attach session state machine.
//!
//! [`Session`] owns every piece of session state and is driven by a single
//! task: host requests, agent messages and launch/connect completions are fed
//! in one at a time, and everything the session has to say goes out through
//! two channels (replies and events for the host, messages for the agent).
//! Work that has to wait (spawning the helper, awaiting an evaluation) is
//! handed back to the caller as an [`Action`].

use std::{io, path::Path, time::Duration};

use dap::{
    Outgoing, Reply, Request,
    events::{BreakpointEventBody, Event, OutputCategory, StoppedEventBody},
    requests::{
        Command, EvaluateArguments, SetBreakpointsArguments, SourceArguments,
        StackTraceArguments,
    },
    responses::{
        Capabilities, ContinueResponse, EvaluateResponse, LoadedSourcesResponse, ResponseBody,
        ScopesResponse, SetBreakpointsResponse, SourceResponse, StackTraceResponse,
        ThreadsResponse, VariablesResponse,
    },
    types::{self, Scope, Source, StackFrame, StackFrameId, Thread, ThreadId, VariablesReference},
};
use launcher::{HelperCommand, Launched};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use wire::{BreakpointLocation, EvalId, ScriptIndex, TextLevel};

use crate::{
    breakpoints::{Breakpoint, BreakpointRegistry},
    config::{AttachArguments, AttachPlan, SessionConfig, expand_home},
    error::SessionError,
    inspector::Inspector,
    pending_evaluations::{EvaluationError, EvaluationResult, PendingEvaluations},
    scripts::{LoadOutcome, ScriptRef, ScriptRegistry, path_key},
    state::{SessionState, StopReason},
};

/// The agent reports a single thread.
pub const THREAD_ID: ThreadId = 1;
const THREAD_NAME: &str = "main";

/// Levels of children the agent expands in an evaluation result.
const EVALUATE_DEPTH: i32 = 1;

/// Follow-up work for the task driving the session.
#[derive(Debug)]
pub enum Action {
    None,
    /// Run the helper, then report back through [`Session::on_launched`].
    Launch {
        helper: HelperCommand,
        timeout: Duration,
    },
    /// Wait for an evaluation result and send the reply it produces.
    Await(PendingEvaluation),
    /// The host disconnected; stop driving the session.
    Exit,
}

/// An evaluation sent to the agent whose reply is still owed to the host.
#[derive(Debug)]
pub struct PendingEvaluation {
    request: Request,
    eval_id: EvalId,
    result: oneshot::Receiver<EvaluationResult>,
    timeout: Duration,
}

/// How a [`PendingEvaluation`] ended.
#[derive(Debug)]
pub struct EvaluationOutcome {
    pub reply: Reply,
    /// Set when the agent never answered; the session must forget the id.
    pub expired: Option<EvalId>,
}

impl PendingEvaluation {
    pub fn eval_id(&self) -> EvalId {
        self.eval_id
    }

    pub async fn wait(self) -> EvaluationOutcome {
        let result = tokio::time::timeout(self.timeout, self.result).await;
        let (reply, expired) = match result {
            Ok(Ok(Ok(value))) => {
                let body = ResponseBody::Evaluate(EvaluateResponse {
                    result: value.value,
                    r#type: value.type_name,
                    variables_reference: value.handle,
                });
                let reply = match body.to_value() {
                    Ok(body) => Reply::ok(&self.request, Some(body)),
                    Err(e) => Reply::error(&self.request, SessionError::Encode(e).to_string()),
                };
                (reply, None)
            }
            Ok(Ok(Err(error))) => (Reply::error(&self.request, String::from(error)), None),
            Ok(Err(_)) => (
                Reply::error(&self.request, SessionError::EvaluationCancelled.to_string()),
                None,
            ),
            Err(_) => {
                tracing::warn!(eval_id = self.eval_id, timeout = ?self.timeout, "evaluation timed out");
                (
                    Reply::error(&self.request, SessionError::EvaluationTimedOut.to_string()),
                    Some(self.eval_id),
                )
            }
        };
        EvaluationOutcome { reply, expired }
    }
}

type HandlerResult = Result<Option<ResponseBody>, SessionError>;

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    host: mpsc::UnboundedSender<Outgoing>,
    agent: Option<mpsc::UnboundedSender<wire::Message>>,
    plan: Option<AttachPlan>,
    scripts: ScriptRegistry,
    breakpoints: BreakpointRegistry,
    inspector: Inspector,
    evaluations: PendingEvaluations,
    next_stop: StopReason,
}

impl Session {
    pub fn new(config: SessionConfig, host: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            host,
            agent: None,
            plan: None,
            scripts: ScriptRegistry::default(),
            breakpoints: BreakpointRegistry::new(),
            inspector: Inspector::new(),
            evaluations: PendingEvaluations::new(),
            next_stop: StopReason::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "session state change");
            self.state = state;
        }
    }

    /// Handle one host request. Every request gets exactly one reply, either
    /// right away or through the returned [`Action::Await`].
    #[tracing::instrument(skip_all, fields(command = %request.command, seq = request.seq))]
    pub fn handle_request(&mut self, request: Request) -> Action {
        let command = match Command::parse(&request) {
            Ok(command) => command,
            Err(e) => {
                self.reply(&request, Err(SessionError::InvalidArguments(e)));
                return Action::None;
            }
        };
        tracing::debug!("handling request");

        let mut action = Action::None;
        let result = match command {
            Command::Initialize(_) => Ok(Some(ResponseBody::Initialize(Capabilities::adapter()))),
            Command::Attach(arguments) => self.attach(arguments).map(|launch| {
                action = launch;
                None
            }),
            Command::ConfigurationDone => Ok(None),
            Command::SetBreakpoints(arguments) => self.set_breakpoints(arguments),
            Command::Threads => Ok(Some(ResponseBody::Threads(ThreadsResponse {
                threads: vec![Thread {
                    id: THREAD_ID,
                    name: THREAD_NAME.to_string(),
                }],
            }))),
            Command::StackTrace(arguments) => Ok(self.stack_trace(arguments)),
            Command::Scopes(arguments) => self.scopes(arguments.frame_id),
            Command::Variables(arguments) => self.variables(arguments.variables_reference),
            Command::Source(arguments) => self.source(arguments),
            Command::LoadedSources => Ok(self.loaded_sources()),
            Command::Continue(_) => self.resume(wire::Message::Continue, StopReason::Breakpoint),
            Command::Next(_) => self.resume(wire::Message::StepOver, StopReason::Step),
            Command::StepIn(_) => self.resume(wire::Message::StepInto, StopReason::Step),
            Command::StepOut(_) => self.resume(wire::Message::StepOut, StopReason::Step),
            Command::Pause(_) => self.pause(),
            Command::Evaluate(arguments) => match self.evaluate(&request, arguments) {
                Ok(pending) => return Action::Await(pending),
                Err(e) => Err(e),
            },
            Command::Disconnect(_) => {
                self.terminate();
                action = Action::Exit;
                Ok(None)
            }
            Command::Unsupported(name) => Err(SessionError::Unsupported(name)),
        };

        self.reply(&request, result);
        action
    }

    fn attach(&mut self, arguments: Value) -> Result<Action, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyAttached);
        }
        let arguments: AttachArguments = serde_json::from_value(arguments)?;
        let plan = arguments.into_plan(&self.config)?;
        tracing::info!(pid = plan.helper.pid, roots = ?plan.source_roots, "attaching");

        self.scripts.set_roots(plan.source_roots.clone());
        let helper = plan.helper.clone();
        self.plan = Some(plan);
        self.set_state(SessionState::Attaching);

        Ok(Action::Launch {
            helper,
            timeout: self.config.attach_timeout,
        })
    }

    /// The helper finished. Returns the agent port to connect to.
    pub fn on_launched(&mut self, result: eyre::Result<Launched>) -> Option<u16> {
        if self.state != SessionState::Attaching {
            tracing::debug!(state = %self.state, "ignoring helper result");
            return None;
        }
        match result {
            Ok(launched) => {
                if !launched.output.is_empty() {
                    self.output(OutputCategory::Console, launched.output.join("\n"));
                }
                tracing::info!(port = launched.port, "agent announced port");
                self.set_state(SessionState::Connecting);
                Some(launched.port)
            }
            Err(e) => {
                tracing::error!(error = %e, "attach helper failed");
                self.fail(format!("failed to attach: {e:#}"));
                None
            }
        }
    }

    pub fn on_connect_failed(&mut self, error: io::Error) {
        if self.state == SessionState::Connecting {
            tracing::error!(error = %error, "connecting to agent failed");
            self.fail(format!("failed to connect to debuggee: {error}"));
        }
    }

    /// The agent socket is open. Returns false if the session no longer
    /// wants it, in which case the connection should be dropped.
    pub fn on_connected(&mut self, agent: mpsc::UnboundedSender<wire::Message>) -> bool {
        if self.state != SessionState::Connecting {
            tracing::debug!(state = %self.state, "dropping late agent connection");
            return false;
        }
        let initialize = self
            .plan
            .as_ref()
            .map(|plan| plan.initialize.clone())
            .unwrap_or_default();

        self.agent = Some(agent);
        self.set_state(SessionState::Initializing);
        self.send_agent(wire::Message::Initialize(initialize));
        true
    }

    /// The agent socket closed or failed.
    pub fn on_agent_closed(&mut self, reason: Option<String>) {
        if self.state == SessionState::Terminated {
            return;
        }
        let text = match reason {
            Some(reason) => format!("connection to debuggee lost: {reason}"),
            None => "debuggee disconnected".to_string(),
        };
        self.fail(text);
    }

    pub fn handle_agent_message(&mut self, message: wire::Message) {
        if !self.state.is_connected() {
            tracing::debug!(?message, state = %self.state, "ignoring agent message");
            return;
        }
        match message {
            wire::Message::InitializeAck => {
                if self.state == SessionState::Initializing {
                    self.set_state(SessionState::Running);
                }
                self.emit(Event::Initialized);
            }
            wire::Message::Text { level, text } => {
                let category = match level {
                    TextLevel::Error => OutputCategory::Stderr,
                    TextLevel::Info | TextLevel::Warning => OutputCategory::Console,
                };
                self.output(category, text);
            }
            wire::Message::LoadScript(script) => self.on_load_script(&script),
            wire::Message::Break { frames } => self.on_break(frames),
            wire::Message::BreakpointAck(location) => {
                tracing::debug!(?location, "agent acknowledged breakpoint");
            }
            wire::Message::EvaluateResponse(response) => {
                self.on_evaluate_response(response);
            }
            wire::Message::Unknown { kind } => {
                tracing::warn!(kind, "ignoring message of unknown kind");
            }
            other => {
                tracing::warn!(kind = other.kind_id(), "ignoring message meant for the agent");
            }
        }
    }

    fn on_load_script(&mut self, script: &wire::LoadScript) {
        match self.scripts.load(script) {
            LoadOutcome::Resolved {
                key,
                path,
                first_load,
                new_index,
            } => {
                tracing::debug!(index = script.index, path = %path.display(), "script loaded");
                self.output(OutputCategory::Console, path.display().to_string());

                if new_index {
                    for location in self
                        .breakpoints
                        .for_key(&key)
                        .iter()
                        .filter_map(|bp| location(script.index, bp.line))
                    {
                        self.send_agent(wire::Message::AddBreakpoint(location));
                    }
                }
                if first_load {
                    for bp in self.breakpoints.for_key(&key) {
                        self.emit(Event::Breakpoint(BreakpointEventBody {
                            reason: "changed".to_string(),
                            breakpoint: dap_breakpoint(bp, true),
                        }));
                    }
                }
            }
            LoadOutcome::Unresolved { name } => {
                tracing::warn!(index = script.index, name = %name, "could not resolve script path");
            }
        }
        self.send_agent(wire::Message::LoadDone);
    }

    fn on_break(&mut self, frames: Vec<wire::StackNode>) {
        self.inspector.record_stop(frames);
        self.set_state(SessionState::Stopped);
        let reason = std::mem::take(&mut self.next_stop);
        self.emit(Event::Stopped(StoppedEventBody {
            reason: reason.as_str().to_string(),
            thread_id: THREAD_ID,
            all_threads_stopped: true,
        }));
    }

    fn on_evaluate_response(&mut self, response: wire::EvaluateResponse) {
        if !self.evaluations.is_pending(response.eval_id) {
            tracing::debug!(eval_id = response.eval_id, "dropping unmatched evaluation response");
            return;
        }
        let result = match response.result {
            Ok(node) => Ok(self.inspector.evaluation_result(node)),
            Err(message) => Err(EvaluationError::Failed(message)),
        };
        self.evaluations.complete(response.eval_id, result);
    }

    /// The waiter for `eval_id` gave up; a late response is dropped.
    pub fn forget_evaluation(&mut self, eval_id: EvalId) {
        self.evaluations.forget(eval_id);
    }

    fn set_breakpoints(&mut self, arguments: SetBreakpointsArguments) -> HandlerResult {
        let lines = arguments.requested_lines();
        let path = arguments
            .source
            .path
            .as_deref()
            .map(|path| expand_home(Path::new(path)).into_owned())
            .ok_or(SessionError::MissingSourcePath)?;
        let key = path_key(&path);

        let previous = self.breakpoints.replace(&key, &path, &lines);
        let loaded = self.scripts.by_key(&key).map(|script| script.index);

        if let Some(index) = loaded {
            for location in previous.iter().filter_map(|bp| location(index, bp.line)) {
                self.send_agent(wire::Message::RemoveBreakpoint(location));
            }
            for location in self
                .breakpoints
                .for_key(&key)
                .iter()
                .filter_map(|bp| location(index, bp.line))
            {
                self.send_agent(wire::Message::AddBreakpoint(location));
            }
        } else {
            tracing::debug!(path = %path.display(), count = lines.len(), "queueing breakpoints until script loads");
        }

        let breakpoints = self
            .breakpoints
            .for_key(&key)
            .iter()
            .map(|bp| dap_breakpoint(bp, loaded.is_some()))
            .collect();
        Ok(Some(ResponseBody::SetBreakpoints(SetBreakpointsResponse {
            breakpoints,
        })))
    }

    fn stack_trace(&self, arguments: StackTraceArguments) -> Option<ResponseBody> {
        let frames: &[wire::FrameNode] = if self.state == SessionState::Stopped {
            self.inspector.frames()
        } else {
            &[]
        };
        let start = arguments.start_frame.unwrap_or(0).min(frames.len());
        let end = match arguments.levels {
            Some(levels) if levels > 0 => start.saturating_add(levels).min(frames.len()),
            _ => frames.len(),
        };

        let stack_frames = frames[start..end]
            .iter()
            .enumerate()
            .map(|(offset, frame)| StackFrame {
                id: (start + offset + 1) as StackFrameId,
                name: frame.function_name.clone(),
                source: self.source_for(frame.script_index),
                line: i64::from(frame.line),
                column: 0,
            })
            .collect();

        Some(ResponseBody::StackTrace(StackTraceResponse {
            stack_frames,
            total_frames: frames.len(),
        }))
    }

    fn source_for(&self, index: ScriptIndex) -> Option<Source> {
        match self.scripts.by_index(index)? {
            ScriptRef::Loaded(script) => Some(path_source(&script.path)),
            ScriptRef::Pending { name, reference } => Some(Source {
                name: Some(name.to_string()),
                source_reference: reference,
                presentation_hint: reference.is_none().then(|| "deemphasize".to_string()),
                ..Default::default()
            }),
        }
    }

    fn scopes(&mut self, frame_id: StackFrameId) -> HandlerResult {
        self.require_stopped()?;
        let handle = self
            .inspector
            .scope_handle(frame_id)
            .ok_or(SessionError::UnknownFrame(frame_id))?;
        Ok(Some(ResponseBody::Scopes(ScopesResponse {
            scopes: vec![Scope {
                name: "Local".to_string(),
                presentation_hint: Some("locals".to_string()),
                variables_reference: handle,
                expensive: false,
            }],
        })))
    }

    fn variables(&mut self, handle: VariablesReference) -> HandlerResult {
        let views = self
            .inspector
            .variables(handle)
            .ok_or(SessionError::UnknownHandle(handle))?;
        let variables = views
            .into_iter()
            .map(|view| types::Variable {
                name: view.name,
                value: view.value,
                r#type: view.type_name,
                variables_reference: view.handle,
            })
            .collect();
        Ok(Some(ResponseBody::Variables(VariablesResponse { variables })))
    }

    fn source(&self, arguments: SourceArguments) -> HandlerResult {
        let reference = match arguments.source_reference {
            0 => arguments
                .source
                .and_then(|source| source.source_reference)
                .unwrap_or(0),
            reference => reference,
        };
        let content = self
            .scripts
            .source(reference)
            .ok_or(SessionError::UnknownSource(reference))?;
        Ok(Some(ResponseBody::Source(SourceResponse {
            content: content.to_string(),
            mime_type: Some("text/x-lua".to_string()),
        })))
    }

    fn loaded_sources(&self) -> Option<ResponseBody> {
        let sources = self
            .scripts
            .loaded()
            .into_iter()
            .map(|script| path_source(&script.path))
            .collect();
        Some(ResponseBody::LoadedSources(LoadedSourcesResponse { sources }))
    }

    /// Continue or step. The agent does not acknowledge these, so the session
    /// moves to `Running` straight away.
    fn resume(&mut self, message: wire::Message, next_stop: StopReason) -> HandlerResult {
        self.require_agent()?;
        self.send_agent(message);
        self.next_stop = next_stop;
        self.cancel_evaluations();
        if self.state == SessionState::Stopped {
            self.set_state(SessionState::Running);
        }
        Ok(Some(ResponseBody::Continue(ContinueResponse {
            all_threads_continued: true,
        })))
    }

    fn pause(&mut self) -> HandlerResult {
        self.require_agent()?;
        self.send_agent(wire::Message::Pause);
        self.next_stop = StopReason::Pause;
        self.cancel_evaluations();
        Ok(None)
    }

    fn evaluate(
        &mut self,
        request: &Request,
        arguments: EvaluateArguments,
    ) -> Result<PendingEvaluation, SessionError> {
        self.require_stopped()?;
        let stack_level = match arguments.frame_id {
            Some(frame_id) => self
                .inspector
                .stack_level(frame_id)
                .ok_or(SessionError::UnknownFrame(frame_id))?,
            None => 0,
        };
        self.require_agent()?;

        let (eval_id, result) = self.evaluations.register();
        tracing::debug!(eval_id, stack_level, expression = %arguments.expression, "evaluating");
        self.send_agent(wire::Message::EvaluateRequest(wire::EvaluateRequest {
            eval_id,
            stack_level,
            depth: EVALUATE_DEPTH,
            expression: arguments.expression,
        }));

        let timeout = self
            .plan
            .as_ref()
            .map(|plan| plan.evaluate_timeout)
            .unwrap_or(self.config.evaluate_timeout);
        Ok(PendingEvaluation {
            request: request.clone(),
            eval_id,
            result,
            timeout,
        })
    }

    fn cancel_evaluations(&mut self) {
        let cancelled = self.evaluations.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelled pending evaluations");
        }
    }

    /// Close the agent connection and drop all session state.
    fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.set_state(SessionState::Terminated);
        self.agent = None;
        self.cancel_evaluations();
        self.inspector.clear();
        self.scripts.clear();
        self.breakpoints.clear();
    }

    /// Report a fatal problem to the host and end the session.
    fn fail(&mut self, text: String) {
        self.output(OutputCategory::Stderr, text);
        self.terminate();
        self.emit(Event::Terminated);
    }

    fn require_stopped(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Stopped => Ok(()),
            other => Err(SessionError::NotStopped(other)),
        }
    }

    fn require_agent(&self) -> Result<(), SessionError> {
        match &self.agent {
            Some(_) => Ok(()),
            None => Err(SessionError::NotConnected),
        }
    }

    fn send_agent(&self, message: wire::Message) {
        match &self.agent {
            Some(agent) => {
                tracing::trace!(?message, "sending to agent");
                if agent.send(message).is_err() {
                    tracing::debug!("agent writer has shut down");
                }
            }
            None => tracing::debug!(?message, "not connected, dropping agent message"),
        }
    }

    fn reply(&self, request: &Request, result: HandlerResult) {
        let body = result.and_then(|body| {
            body.map(|body| body.to_value().map_err(SessionError::Encode))
                .transpose()
        });
        let reply = match body {
            Ok(body) => Reply::ok(request, body),
            Err(e) => {
                tracing::debug!(error = %e, "request failed");
                Reply::error(request, e.to_string())
            }
        };
        self.send_host(reply.into());
    }

    fn emit(&self, event: Event) {
        self.send_host(event.into());
    }

    fn output(&self, category: OutputCategory, mut text: String) {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.emit(Event::output(category, text));
    }

    fn send_host(&self, message: Outgoing) {
        if self.host.send(message).is_err() {
            tracing::debug!("host writer has shut down");
        }
    }
}

fn location(script_index: ScriptIndex, line: i64) -> Option<BreakpointLocation> {
    match i32::try_from(line) {
        Ok(line) => Some(BreakpointLocation { script_index, line }),
        Err(_) => {
            tracing::warn!(line, "breakpoint line out of range");
            None
        }
    }
}

fn path_source(path: &Path) -> Source {
    Source {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        path: Some(path.display().to_string()),
        ..Default::default()
    }
}

fn dap_breakpoint(bp: &Breakpoint, verified: bool) -> types::Breakpoint {
    types::Breakpoint {
        id: Some(bp.id),
        verified,
        message: None,
        source: Some(path_source(&bp.source_path)),
        line: Some(bp.line),
    }
}
