//! Integration tests for the `fnharness` binary.
//!
//! These drive the compiled binary, mostly with shell one-liners standing in for
//! misbehaving functions and check exit codes and stderr. Each test points
//! `XDG_CONFIG_HOME` at an empty temp dir so a developer's own config file
//! cannot leak in.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

fn fnharness(args: &[&str]) -> Output {
    let config_home = tempfile::TempDir::new().unwrap();
    Command::new(env!("CARGO_BIN_EXE_fnharness"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .output()
        .expect("failed to run fnharness")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_function_path_prints_usage() {
    let output = fnharness(&[]);
    let stderr = stderr_of(&output);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Please supply a path"), "stderr: {stderr}");
    assert!(stderr.contains("Usage"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn bad_option_is_a_usage_error() {
    let output = fnharness(&["--grace-ms", "soon", "true"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn help_exits_successfully() {
    let output = fnharness(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("<FUNCTION>"));
}

#[test]
fn function_that_exits_cleanly_warns() {
    let output = fnharness(&["true"]);
    let stderr = stderr_of(&output);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr.contains("Warning: function process finished unexpectedly."),
        "stderr: {stderr}"
    );
}

#[test]
fn crashing_function_is_a_harness_fault() {
    let output = fnharness(&["sh", "-c", "exit 3"]);
    let stderr = stderr_of(&output);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.starts_with("Error: "), "stderr: {stderr}");
    assert!(stderr.contains("crashed"), "stderr: {stderr}");
}

#[test]
fn missing_executable_is_a_harness_fault() {
    let output = fnharness(&["/no/such/function"]);
    let stderr = stderr_of(&output);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("failed to start function process"), "stderr: {stderr}");
}

#[test]
fn options_after_function_are_passed_through() {
    // The script exits 4 only if it received `--deadline-secs` verbatim.
    let output = fnharness(&[
        "sh",
        "-c",
        "test \"$1\" = --deadline-secs && exit 4; exit 9",
        "script",
        "--deadline-secs",
    ]);
    let stderr = stderr_of(&output);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("exit status: 4"), "stderr: {stderr}");
}

#[test]
fn function_output_goes_to_stderr() {
    let output = fnharness(&["sh", "-c", "echo from-function; exit 5"]);
    assert!(output.stdout.is_empty());
    assert!(stderr_of(&output).contains("from-function"));
}

/// The `mock-function` binary of fnharness-test-utils. Cargo places it next
/// to `fnharness` when the whole workspace is built for testing.
fn mock_function() -> Option<PathBuf> {
    let path = Path::new(env!("CARGO_BIN_EXE_fnharness"))
        .with_file_name(format!("mock-function{}", std::env::consts::EXE_SUFFIX));
    path.exists().then_some(path)
}

fn fnharness_with_stdin(args: &[&str], payload: &[u8]) -> Output {
    let config_home = tempfile::TempDir::new().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_fnharness"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run fnharness");
    child.stdin.take().unwrap().write_all(payload).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn mock_function_result_is_written_to_stdout() {
    let Some(mock) = mock_function() else {
        eprintln!("skipping: mock-function not built (run the workspace tests)");
        return;
    };
    let output = fnharness_with_stdin(
        &[mock.to_str().unwrap(), "echo"],
        b"{\"hello\":\"world\"}",
    );
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr_of(&output));
    assert_eq!(output.stdout, b"{\"hello\":\"world\"}");
    // The payload has no trailing newline, so one goes to stderr.
    assert!(output.stderr.ends_with(b"\n"));
}

#[test]
fn mock_function_error_is_rendered_on_stderr() {
    let Some(mock) = mock_function() else {
        eprintln!("skipping: mock-function not built (run the workspace tests)");
        return;
    };
    let output = fnharness_with_stdin(&[mock.to_str().unwrap(), "fail"], b"{}");
    let stderr = stderr_of(&output);
    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
    assert!(
        stderr.contains("The function process encountered an error:\nboom\n\tf.go:5 main.f\n"),
        "stderr: {stderr}"
    );
}

#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(unix)]
fn interrupt(child: &Child) {
    // SAFETY: the pid belongs to a child this test spawned and still owns.
    let ret = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    assert_eq!(ret, 0, "failed to send SIGINT");
}

#[cfg(unix)]
fn wait_for(child: &mut Child, limit: Duration) -> ExitStatus {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("fnharness did not exit within {limit:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[cfg(unix)]
#[test]
fn second_interrupt_kills_function_that_ignores_sigterm() {
    let config_home = tempfile::TempDir::new().unwrap();
    let pid_file = config_home.path().join("function.pid");
    let script = format!(
        "echo $$ > '{}'; trap '' INT TERM; exec sleep 300",
        pid_file.display()
    );

    let mut harness = Command::new(env!("CARGO_BIN_EXE_fnharness"))
        .args(["--grace-ms", "60000", "sh", "-c", &script])
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run fnharness");

    let started = Instant::now();
    let function_pid = loop {
        if let Some(pid) = std::fs::read_to_string(&pid_file)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            break pid;
        }
        assert!(started.elapsed() < Duration::from_secs(10), "function never started");
        std::thread::sleep(Duration::from_millis(10));
    };
    // Let the trap and the harness's signal handler settle.
    std::thread::sleep(Duration::from_millis(300));

    interrupt(&harness);
    std::thread::sleep(Duration::from_millis(300));
    assert!(is_alive(function_pid), "SIGTERM is ignored during the grace period");
    interrupt(&harness);

    let status = wait_for(&mut harness, Duration::from_secs(10));
    assert_eq!(status.code(), Some(130));
    assert!(
        !is_alive(function_pid),
        "function process {function_pid} outlived the harness"
    );

    let mut stderr = String::new();
    harness.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    assert!(stderr.contains("Force exit."), "stderr: {stderr}");
    assert!(stderr.contains("Interrupted."), "stderr: {stderr}");
}
