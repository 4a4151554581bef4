//! Rendering of invocation outcomes and the exit codes that go with them.
//!
//! stdout carries the result payload and nothing else. Everything meant for
//! a human goes to stderr.

use std::io::{self, Write};

use fnharness_wire::messages::InvokeError;

use crate::invoke::InvocationOutcome;

pub const ERROR_BANNER: &str = "The function process encountered an error:";
pub const UNEXPECTED_EXIT_WARNING: &str = "Warning: function process finished unexpectedly.";

pub const EXIT_SUCCESS: u8 = 0;
/// Missing function path or bad option.
pub const EXIT_USAGE: u8 = 1;
pub const EXIT_FUNCTION_ERROR: u8 = 1;
/// The function exited with status 0 on its own.
pub const EXIT_UNEXPECTED_EXIT: u8 = 1;
pub const EXIT_HARNESS_FAULT: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Writes the payload verbatim. When it does not end in a newline, one is
/// written to stderr so the shell prompt starts on a fresh line without
/// altering stdout.
pub fn report_success(
    payload: &[u8],
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> io::Result<()> {
    stdout.write_all(payload)?;
    stdout.flush()?;
    if payload.last() != Some(&b'\n') {
        stderr.write_all(b"\n")?;
        stderr.flush()?;
    }
    Ok(())
}

pub fn report_function_error(error: &InvokeError, stderr: &mut impl Write) -> io::Result<()> {
    writeln!(stderr)?;
    writeln!(stderr, "{ERROR_BANNER}")?;
    writeln!(stderr, "{}", error.message)?;
    for frame in &error.stack_trace {
        writeln!(stderr, "\t{}:{} {}", frame.path, frame.line, frame.label)?;
    }
    stderr.flush()
}

/// Renders `outcome` and returns the exit code for it.
pub fn report_outcome(
    outcome: &InvocationOutcome,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> io::Result<u8> {
    match outcome {
        InvocationOutcome::Success(payload) => {
            report_success(payload, stdout, stderr)?;
            Ok(EXIT_SUCCESS)
        }
        InvocationOutcome::FunctionError(error) => {
            report_function_error(error, stderr)?;
            Ok(EXIT_FUNCTION_ERROR)
        }
    }
}
