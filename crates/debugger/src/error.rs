//! Errors reported back to the host as failed responses.

use dap::types::{StackFrameId, VariablesReference};

use crate::state::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("invalid attach configuration: {0}")]
    InvalidAttach(String),

    #[error("already attached")]
    AlreadyAttached,

    #[error("not connected to the debuggee")]
    NotConnected,

    #[error("not stopped (session is {0})")]
    NotStopped(SessionState),

    #[error("unknown frame id {0}")]
    UnknownFrame(StackFrameId),

    #[error("unknown or expired variables reference {0}")]
    UnknownHandle(VariablesReference),

    #[error("unknown source reference {0}")]
    UnknownSource(i64),

    #[error("setBreakpoints requires a source path")]
    MissingSourcePath,

    #[error("evaluation cancelled")]
    EvaluationCancelled,

    #[error("evaluation timed out")]
    EvaluationTimedOut,

    #[error("unsupported command {0:?}")]
    Unsupported(String),

    #[error("could not encode response body: {0}")]
    Encode(#[source] serde_json::Error),
}
