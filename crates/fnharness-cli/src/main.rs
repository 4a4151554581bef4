mod config;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tokio::io::AsyncReadExt;

use fnharness_core::report::{
    EXIT_HARNESS_FAULT, EXIT_INTERRUPTED, EXIT_USAGE, UNEXPECTED_EXIT_WARNING, report_outcome,
};
use fnharness_core::{FunctionCommand, HarnessConfig, HarnessError, Interrupt, SessionOutcome};

use config::Overrides;

#[derive(Parser)]
#[command(
    name = "fnharness",
    version,
    override_usage = "fnharness [OPTIONS] <FUNCTION> [ARGS]...",
    about = "Invoke a Lambda-style function executable locally",
    long_about = "Starts the function, waits for it to become ready, invokes it once with \
                  stdin as the payload, prints the result to stdout and stops the function."
)]
struct Cli {
    /// Seconds from invocation to the deadline passed to the function
    #[arg(long, value_name = "SECS")]
    deadline_secs: Option<u64>,

    /// Delay between readiness checks, in milliseconds
    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Time the function gets to exit after SIGTERM before it is killed
    #[arg(long, value_name = "MS")]
    grace_ms: Option<u64>,

    /// Environment variable that tells the function which port to serve on
    #[arg(long, value_name = "NAME")]
    port_env: Option<String>,

    /// Config file (defaults to ~/.config/fnharness/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to the compiled function executable, followed by arguments
    /// passed through to it unchanged
    #[arg(value_name = "FUNCTION", trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<OsString>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port_env: self.port_env.clone(),
            poll_interval_ms: self.poll_interval_ms,
            deadline_secs: self.deadline_secs,
            grace_ms: self.grace_ms,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures.
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let mut words = std::mem::take(&mut cli.command).into_iter();
    let Some(program) = words.next() else {
        eprintln!(
            "Error: Please supply a path to a compiled function executable. Provide input on stdin."
        );
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::from(EXIT_USAGE);
    };

    let config = match config::resolve(&cli.overrides(), cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let command = FunctionCommand {
        program: PathBuf::from(program),
        args: words.collect(),
    };
    match invoke_function(command, &config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_HARNESS_FAULT)
        }
    }
}

/// Reads the payload, runs the function once and reports the outcome.
/// Returns the process exit code.
async fn invoke_function(command: FunctionCommand, config: &HarnessConfig) -> anyhow::Result<u8> {
    let mut payload = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut payload)
        .await
        .context("failed to read payload from stdin")?;
    tracing::debug!(
        function = %command.program.display(),
        payload_len = payload.len(),
        "read payload"
    );

    // First signal stops the run gracefully, second kills the function
    // without waiting out the grace period. Either way the run returns only
    // once the function process is gone.
    let interrupt = Interrupt::new();
    let signals = interrupt.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nStopping function process (Ctrl+C again to force)...");
        signals.stop();

        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nForce exit.");
        signals.force();
    });

    match fnharness_core::run(command, payload, config, interrupt).await {
        Ok(SessionOutcome::Invoked(outcome)) => {
            let stdout = std::io::stdout();
            let stderr = std::io::stderr();
            report_outcome(&outcome, &mut stdout.lock(), &mut stderr.lock())
                .context("failed to write invocation result")
        }
        Ok(SessionOutcome::Interrupted) => {
            eprintln!("Interrupted.");
            Ok(EXIT_INTERRUPTED)
        }
        Err(HarnessError::UnexpectedExit) => {
            eprintln!("{UNEXPECTED_EXIT_WARNING}");
            Ok(HarnessError::UnexpectedExit.exit_code())
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("Error: {:#}", anyhow::Error::new(e));
            Ok(code)
        }
    }
}
