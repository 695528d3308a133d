//! Session configuration.
//!
//! Process-wide defaults come from the command line ([`SessionConfig`]); the
//! host's attach request ([`AttachArguments`]) fills in the target and may
//! override them.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    time::Duration,
};

use launcher::HelperCommand;
use serde::Deserialize;

use crate::error::SessionError;

pub const DEFAULT_EVALUATE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_EVALUATE_TIMEOUT: Duration = Duration::from_millis(DEFAULT_EVALUATE_TIMEOUT_MS);

/// Helper executable relative to the extension directory.
const DEFAULT_HELPER: &str = "server/windows/x86/emmy.tool.exe";
/// Injection script relative to the extension directory.
const DEFAULT_INJECTION_SCRIPT: &str = "server/Emmy.lua";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub evaluate_timeout: Duration,
    pub attach_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            evaluate_timeout: DEFAULT_EVALUATE_TIMEOUT,
            attach_timeout: launcher::HELPER_READY_TIMEOUT,
            max_frame_size: wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Arguments of the host's `attach` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    /// Process to attach to
    pub pid: u32,

    /// Directory holding the bundled helper and injection script
    #[serde(default)]
    pub extension_path: Option<PathBuf>,

    #[serde(default)]
    pub helper_executable: Option<PathBuf>,

    #[serde(default)]
    pub injection_script: Option<PathBuf>,

    /// Roots used to resolve relative script names, earliest first
    #[serde(default, alias = "sourceRoots")]
    pub source_paths: Vec<PathBuf>,

    #[serde(default)]
    pub evaluate_timeout_ms: Option<u64>,

    #[serde(default = "enabled")]
    pub capture_stdout: bool,

    #[serde(default = "enabled")]
    pub capture_debug_output: bool,
}

fn enabled() -> bool {
    true
}

/// Everything needed to run one attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachPlan {
    pub helper: HelperCommand,
    pub source_roots: Vec<PathBuf>,
    pub evaluate_timeout: Duration,
    /// Handshake sent once the agent socket is open.
    pub initialize: wire::Initialize,
}

impl AttachArguments {
    pub fn into_plan(self, config: &SessionConfig) -> Result<AttachPlan, SessionError> {
        let extension_path = self.extension_path.as_deref().map(expand_home);

        let executable = match (self.helper_executable.as_deref(), extension_path.as_deref()) {
            (Some(helper), _) => expand_home(helper).into_owned(),
            (None, Some(ext)) => ext.join(DEFAULT_HELPER),
            (None, None) => {
                return Err(SessionError::InvalidAttach(
                    "either helperExecutable or extensionPath is required".to_string(),
                ));
            }
        };

        let injection_script = match (self.injection_script.as_deref(), extension_path.as_deref())
        {
            (Some(script), _) => expand_home(script).into_owned(),
            (None, Some(ext)) => ext.join(DEFAULT_INJECTION_SCRIPT),
            (None, None) => {
                return Err(SessionError::InvalidAttach(
                    "either injectionScript or extensionPath is required".to_string(),
                ));
            }
        };

        let source_roots = self
            .source_paths
            .iter()
            .map(|root| expand_home(root).into_owned())
            .collect();

        let evaluate_timeout = self
            .evaluate_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(config.evaluate_timeout);

        let initialize = wire::Initialize {
            symbol_path: String::new(),
            helper_script: injection_script.display().to_string(),
            capture_stdout: self.capture_stdout,
            capture_debug_output: self.capture_debug_output,
        };

        Ok(AttachPlan {
            helper: HelperCommand {
                executable,
                pid: self.pid,
                injection_script,
            },
            source_roots,
            evaluate_timeout,
            initialize,
        })
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> Cow<'_, Path> {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped));
        }
        tracing::warn!("cannot determine home directory, using path as-is");
    }
    Cow::Borrowed(path)
}
