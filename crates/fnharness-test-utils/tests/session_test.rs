//! End-to-end harness runs against the `mock-function` binary.
//!
//! Each test launches the mock as a real child process through
//! `fnharness_core::run`, so port injection, the handshake, the invocation
//! and teardown are all exercised together.

use std::path::PathBuf;
use std::time::Duration;

use fnharness_core::invoke::InvocationOutcome;
use fnharness_core::{FunctionCommand, HarnessConfig, HarnessError, Interrupt, SessionOutcome, run};
use fnharness_test_utils::sample_error;

fn mock(mode: &str) -> FunctionCommand {
    FunctionCommand {
        program: PathBuf::from(env!("CARGO_BIN_EXE_mock-function")),
        args: vec![mode.into()],
    }
}

async fn run_mock(mode: &str, payload: &[u8]) -> Result<SessionOutcome, HarnessError> {
    let config = HarnessConfig::default();
    let run = run(mock(mode), payload.to_vec(), &config, Interrupt::new());
    tokio::time::timeout(Duration::from_secs(30), run)
        .await
        .expect("harness run should finish")
}

#[tokio::test]
async fn echo_returns_payload_verbatim() {
    let outcome = run_mock("echo", b"{\"hello\":\"world\"}").await.unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Invoked(InvocationOutcome::Success(b"{\"hello\":\"world\"}".to_vec()))
    );
}

#[tokio::test]
async fn empty_payload_round_trips() {
    let outcome = run_mock("echo", b"").await.unwrap();
    assert_eq!(outcome, SessionOutcome::Invoked(InvocationOutcome::Success(Vec::new())));
}

#[tokio::test]
async fn function_error_is_an_outcome_not_a_fault() {
    let outcome = run_mock("fail", b"{}").await.unwrap();
    assert_eq!(
        outcome,
        SessionOutcome::Invoked(InvocationOutcome::FunctionError(sample_error()))
    );
}

#[tokio::test]
async fn slow_start_is_waited_for() {
    let outcome = run_mock("slow-start", b"late").await.unwrap();
    assert_eq!(outcome, SessionOutcome::Invoked(InvocationOutcome::Success(b"late".to_vec())));
}

#[tokio::test]
async fn rejected_pings_are_retried() {
    let outcome = run_mock("reject-pings", b"x").await.unwrap();
    assert_eq!(outcome, SessionOutcome::Invoked(InvocationOutcome::Success(b"x".to_vec())));
}

#[tokio::test]
async fn crash_during_invoke_is_reported_as_crash() {
    let err = run_mock("crash-on-invoke", b"{}").await.unwrap_err();
    match err {
        HarnessError::Crashed { status } => assert_eq!(status.code(), Some(3)),
        other => panic!("expected crash, got {other:?}"),
    }
}
