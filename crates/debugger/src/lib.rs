//! Attach debug session.
//!
//! Bridges a debug adapter host (speaking the `dap` crate's protocol over
//! stdio) to an agent injected into a running script process (speaking the
//! `wire` protocol over TCP).
//!
//! - [`Session`] is the state machine; it owns the script and breakpoint
//!   registries, the stack inspector and the pending evaluations
//! - [`run`] drives a session from host streams until the host disconnects

mod adapter;
mod breakpoints;
mod config;
mod error;
mod inspector;
mod pending_evaluations;
mod scripts;
mod session;
mod state;

pub mod testing;

pub use adapter::run;
pub use breakpoints::{Breakpoint, BreakpointRegistry};
pub use config::{
    AttachArguments, AttachPlan, DEFAULT_EVALUATE_TIMEOUT, DEFAULT_EVALUATE_TIMEOUT_MS, SessionConfig,
    expand_home,
};
pub use error::SessionError;
pub use inspector::{EvaluatedValue, Inspector, NO_HANDLE, VariableView};
pub use pending_evaluations::{EvaluationError, EvaluationResult};
pub use scripts::{LoadOutcome, LoadedScript, ScriptRef, ScriptRegistry, path_key};
pub use session::{Action, EvaluationOutcome, PendingEvaluation, Session, THREAD_ID};
pub use state::SessionState;
