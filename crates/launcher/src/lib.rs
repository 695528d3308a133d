//! Launching the attach helper.
//!
//! The helper injects the debugger agent into a running process, prints the
//! port the agent listens on as a `port:<n>` line and exits. [`launch`] runs
//! it without blocking the caller's runtime and hands back the port together
//! with everything the helper printed.

use std::{
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use eyre::WrapErr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Default timeout for the helper to announce its port
pub const HELPER_READY_TIMEOUT: Duration = Duration::from_secs(30);

const PORT_PREFIX: &str = "port:";

/// Invocation of the helper executable against a target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub executable: PathBuf,
    pub pid: u32,
    /// Script the helper loads into the target to start the agent.
    pub injection_script: PathBuf,
}

impl HelperCommand {
    pub fn args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            "attach".to_string(),
            "-p".to_string(),
            self.pid.to_string(),
            "-e".to_string(),
            self.injection_script.display().to_string(),
        ]
    }
}

/// Result of a successful helper run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    pub port: u16,
    /// Lines the helper printed on stdout, in order, then its stderr lines.
    pub output: Vec<String>,
}

/// Resolve the helper executable.
///
/// Paths with more than one component are used as given; a bare name is
/// looked up on `PATH`, falling back to the name itself.
pub fn resolve_executable(executable: &Path) -> PathBuf {
    if executable.components().count() > 1 {
        return executable.to_path_buf();
    }
    match which::which(executable) {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(executable = %executable.display(), error = %e, "helper not found on PATH");
            executable.to_path_buf()
        }
    }
}

/// Extract the announced port from a line of helper output.
pub fn parse_port_line(line: &str) -> Option<u16> {
    let rest = line.trim().strip_prefix(PORT_PREFIX)?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Run the helper until it exits and return the first port it announced.
///
/// Fails with the collected output attached if the helper cannot be started,
/// does not finish within `timeout`, or never prints a port line.
pub async fn launch(command: &HelperCommand, timeout: Duration) -> eyre::Result<Launched> {
    let executable = resolve_executable(&command.executable);
    tracing::debug!(
        executable = %executable.display(),
        pid = command.pid,
        script = %command.injection_script.display(),
        "starting attach helper"
    );

    let mut child = tokio::process::Command::new(&executable)
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .wrap_err_with(|| format!("spawning helper {}", executable.display()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| eyre::eyre!("helper stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| eyre::eyre!("helper stderr was not captured"))?;

    let mut output = Vec::new();
    let mut errors = Vec::new();
    let run = async {
        tokio::try_join!(
            collect_lines(stdout, &mut output),
            collect_lines(stderr, &mut errors),
        )?;
        child.wait().await.wrap_err("waiting for helper to exit")
    };

    let result = tokio::time::timeout(timeout, run).await;
    // only stdout announces the port; stderr is kept for diagnostics
    let port = output.iter().find_map(|line| parse_port_line(line));
    output.append(&mut errors);

    let status = match result {
        Ok(status) => status?,
        Err(_) => eyre::bail!(
            "timed out after {timeout:?} waiting for attach helper\nCollected output:\n{}",
            output.join("\n")
        ),
    };

    match port {
        Some(port) => {
            tracing::debug!(port, ?status, "helper announced agent port");
            Ok(Launched { port, output })
        }
        None => Err(no_port_error(status, &output)),
    }
}

async fn collect_lines<R>(reader: R, lines: &mut Vec<String>) -> eyre::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    while let Some(line) = reader.next_line().await.wrap_err("reading helper output")? {
        lines.push(line);
    }
    Ok(())
}

fn no_port_error(status: ExitStatus, output: &[String]) -> eyre::Report {
    eyre::eyre!(
        "attach helper did not announce a port (process exited with status: {status})\nCollected output:\n{}",
        output.join("\n")
    )
}
