use std::time::Duration;

use clap::{Parser, ValueEnum};
use debugger::SessionConfig;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Debug adapter that attaches to a running process through an injected agent.
///
/// Speaks the debug adapter protocol on stdin/stdout; logs go to stderr.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    #[clap(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Largest agent frame accepted, in bytes
    #[clap(long, default_value_t = wire::DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,

    /// Default time to wait for an evaluation result
    #[clap(long, default_value_t = debugger::DEFAULT_EVALUATE_TIMEOUT_MS)]
    evaluate_timeout_ms: u64,

    /// Time allowed for the helper to inject the agent and report its port
    #[clap(long, default_value_t = launcher::HELPER_READY_TIMEOUT.as_secs())]
    attach_timeout_secs: u64,
}

impl Args {
    fn config(&self) -> SessionConfig {
        SessionConfig {
            evaluate_timeout: Duration::from_millis(self.evaluate_timeout_ms),
            attach_timeout: Duration::from_secs(self.attach_timeout_secs),
            max_frame_size: self.max_frame_size,
        }
    }
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();

    // stdout carries the protocol
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
    color_eyre::install()?;
    tracing::debug!(?args, "parsed command line arguments");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    let (reader, writer) = dap::stdio();
    let result = runtime.block_on(debugger::run(reader, writer, args.config()));

    // the stdin reader blocks on a worker thread until the host sends more
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
