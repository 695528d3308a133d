use std::fmt;

/// Lifecycle of an attach session.
///
/// ```text
/// Idle -> Attaching -> Connecting -> Initializing -> Running <-> Stopped
///                                                       \          /
///                                                        Terminated
/// ```
///
/// Any state may move to `Terminated`; nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// The helper is injecting the agent and has not announced a port yet.
    Attaching,
    Connecting,
    /// Initialize sent, waiting for the agent's acknowledgement.
    Initializing,
    Running,
    Stopped,
    Terminated,
}

impl SessionState {
    /// Whether the agent socket is open.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::Running | SessionState::Stopped
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Attaching => "attaching",
            SessionState::Connecting => "connecting",
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why the target stops next, based on the last command sent to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StopReason {
    #[default]
    Breakpoint,
    Step,
    Pause,
}

impl StopReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            StopReason::Breakpoint => "breakpoint",
            StopReason::Step => "step",
            StopReason::Pause => "pause",
        }
    }
}
