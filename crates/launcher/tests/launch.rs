#![cfg(unix)]

use std::{io::IsTerminal, os::unix::fs::PermissionsExt, path::PathBuf, time::Duration};

use eyre::WrapErr;
use launcher::{HelperCommand, launch};
use tracing_subscriber::EnvFilter;

// test suite "constructor"
#[ctor::ctor]
fn init() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }

    // error traces
    let _ = color_eyre::install();
}

/// Write an executable shell script standing in for the helper.
fn fake_helper(dir: &tempfile::TempDir, body: &str) -> eyre::Result<PathBuf> {
    let path = dir.path().join("helper.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).context("writing helper script")?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).context("marking helper executable")?;
    Ok(path)
}

fn command(executable: PathBuf) -> HelperCommand {
    HelperCommand {
        executable,
        pid: 1234,
        injection_script: PathBuf::from("/ext/server/Emmy.lua"),
    }
}

#[tokio::test]
async fn announced_port_is_returned() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let helper = fake_helper(&dir, "echo \"attaching to $4\"\necho port:9966\necho done")?;

    let launched = launch(&command(helper), Duration::from_secs(10))
        .await
        .context("launching helper")?;

    assert_eq!(launched.port, 9966);
    assert_eq!(launched.output, vec!["attaching to 1234", "port:9966", "done"]);
    Ok(())
}

#[tokio::test]
async fn missing_port_reports_output() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let helper = fake_helper(&dir, "echo 'injection failed'\nexit 3")?;

    let err = launch(&command(helper), Duration::from_secs(10))
        .await
        .expect_err("helper without port must fail");

    let message = err.to_string();
    assert!(message.contains("did not announce a port"), "{message}");
    assert!(message.contains("injection failed"), "{message}");
    Ok(())
}

#[tokio::test]
async fn helper_errors_are_reported() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let helper = fake_helper(&dir, "echo starting\necho 'OpenProcess: access denied' >&2\nexit 1")?;

    let err = launch(&command(helper), Duration::from_secs(10))
        .await
        .expect_err("helper without port must fail");

    let message = err.to_string();
    assert!(message.contains("starting"), "{message}");
    assert!(message.contains("OpenProcess: access denied"), "{message}");
    Ok(())
}

#[tokio::test]
async fn port_on_stderr_is_not_used() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let helper = fake_helper(&dir, "echo port:1 >&2\necho port:2")?;

    let launched = launch(&command(helper), Duration::from_secs(10)).await?;

    assert_eq!(launched.port, 2);
    assert_eq!(launched.output, vec!["port:2", "port:1"]);
    Ok(())
}

#[tokio::test]
async fn slow_helper_times_out() -> eyre::Result<()> {
    let dir = tempfile::tempdir()?;
    let helper = fake_helper(&dir, "echo starting\nsleep 30")?;

    let err = launch(&command(helper), Duration::from_millis(200))
        .await
        .expect_err("helper must time out");

    assert!(err.to_string().contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn missing_executable_fails() {
    let result = launch(
        &command(PathBuf::from("/nonexistent/emmy.tool.exe")),
        Duration::from_secs(1),
    )
    .await;

    assert!(result.is_err());
}
