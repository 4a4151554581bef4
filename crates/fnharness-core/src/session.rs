//! One harness run from port allocation to teardown.

use std::any::Any;
use std::ffi::OsString;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use fnharness_wire::RpcError;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::handshake::handshake;
use crate::invoke::{InvocationOutcome, build_request, deadline_from, invoke};
use crate::port::allocate_port;
use crate::process::{ChildExit, FunctionProcess, ProcessSpec};

/// How long a transport failure waits for the child to report an exit, so
/// a crash is reported as a crash rather than as a dropped connection.
const CRASH_SETTLE: Duration = Duration::from_millis(100);

/// The function executable and what to feed it.
#[derive(Debug, Clone)]
pub struct FunctionCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

/// How a run ended when the harness itself did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The invocation completed and the function was shut down.
    Invoked(InvocationOutcome),
    /// `interrupt` fired before the invocation completed.
    Interrupted,
}

/// User stop requests for a run, usually wired to Ctrl-C.
#[derive(Debug, Clone)]
pub struct Interrupt {
    stop: CancellationToken,
    force: CancellationToken,
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            stop: CancellationToken::new(),
            force: CancellationToken::new(),
        }
    }

    /// Abandons the run. The child still gets the configured grace period.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Abandons the run and kills the child without waiting out the grace
    /// period, including a teardown already in progress.
    pub fn force(&self) {
        self.force.cancel();
        self.stop.cancel();
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

enum Raced {
    Exchange(Result<Result<InvocationOutcome, RpcError>, Box<dyn Any + Send>>),
    ChildExited(Result<ChildExit, HarnessError>),
    Interrupted,
}

/// Runs the function once with `payload` and tears it down.
///
/// The handshake and invocation race the child's exit and `interrupt`. The
/// child is shut down on every path out of this function, including a panic
/// in the exchange, which is resumed once the child is gone.
pub async fn run(
    command: FunctionCommand,
    payload: Vec<u8>,
    config: &HarnessConfig,
    interrupt: Interrupt,
) -> Result<SessionOutcome, HarnessError> {
    let port = allocate_port()?;
    let spec = ProcessSpec {
        program: command.program,
        args: command.args,
        port_env: config.port_env.clone(),
        port,
        shutdown_grace: config.shutdown_grace,
        force: interrupt.force.clone(),
    };
    let process = FunctionProcess::spawn(&spec)?;
    debug!(pid = process.id(), port, "waiting for function process");
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    supervise_exchange(process, exchange(addr, payload, config), &interrupt.stop).await
}

/// Races `exchange` against the child's exit and `stop`, then tears the
/// child down.
async fn supervise_exchange<F>(
    mut process: FunctionProcess,
    exchange: F,
    stop: &CancellationToken,
) -> Result<SessionOutcome, HarnessError>
where
    F: Future<Output = Result<InvocationOutcome, RpcError>>,
{
    let exchanged = AssertUnwindSafe(exchange).catch_unwind();
    let raced = tokio::select! {
        result = exchanged => Raced::Exchange(result),
        exit = process.wait_exit() => Raced::ChildExited(exit),
        () = stop.cancelled() => Raced::Interrupted,
    };

    let result = match raced {
        Raced::Exchange(Ok(Ok(outcome))) => Ok(SessionOutcome::Invoked(outcome)),
        Raced::Exchange(Ok(Err(e))) => Err(settle_fault(&mut process, e).await),
        Raced::Exchange(Err(panic)) => {
            warn!("harness panicked, tearing down function process");
            let _ = process.shutdown().await;
            std::panic::resume_unwind(panic);
        }
        Raced::ChildExited(Ok(exit)) => {
            debug!(?exit, "function process exited before the invocation completed");
            Err(exit.into_fault().unwrap_or(HarnessError::UnexpectedExit))
        }
        Raced::ChildExited(Err(e)) => Err(e),
        Raced::Interrupted => {
            info!("interrupted, tearing down function process");
            Ok(SessionOutcome::Interrupted)
        }
    };

    let exit = process.shutdown().await;
    match (result, exit) {
        // The child may die from the same signal; the interrupt is what counts.
        (Ok(SessionOutcome::Interrupted), _) => Ok(SessionOutcome::Interrupted),
        // A crash after a completed exchange still fails the run.
        (Ok(outcome), Ok(exit)) => match exit.into_fault() {
            Some(fault) => Err(fault),
            None => Ok(outcome),
        },
        (Ok(_), Err(e)) | (Err(e), _) => Err(e),
    }
}

/// Handshake then the single invocation. The deadline is taken once the
/// function is ready.
async fn exchange(
    addr: SocketAddr,
    payload: Vec<u8>,
    config: &HarnessConfig,
) -> Result<InvocationOutcome, RpcError> {
    let mut client = handshake(addr, config.poll_interval).await;
    let request = build_request(payload, deadline_from(Utc::now(), config.deadline_window));
    invoke(&mut client, &request).await
}

async fn settle_fault(process: &mut FunctionProcess, error: RpcError) -> HarnessError {
    if error.is_transport() {
        if let Ok(Ok(exit)) = tokio::time::timeout(CRASH_SETTLE, process.wait_exit()).await {
            if let Some(fault) = exit.into_fault() {
                return fault;
            }
        }
    }
    HarnessError::Rpc(error)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn sleeper() -> FunctionProcess {
        FunctionProcess::spawn(&ProcessSpec {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "sleep 30".into()],
            port_env: "TEST_PORT".to_owned(),
            port: 4242,
            shutdown_grace: Duration::ZERO,
            force: CancellationToken::new(),
        })
        .unwrap()
    }

    #[cfg(unix)]
    fn is_alive(pid: u32) -> bool {
        // SAFETY: signal 0 only checks for existence.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    async fn exploding_exchange() -> Result<InvocationOutcome, RpcError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        panic!("exchange blew up");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn panic_in_exchange_tears_down_child_before_resuming() {
        let process = sleeper();
        let pid = process.id().unwrap();
        let stop = CancellationToken::new();

        let result = AssertUnwindSafe(supervise_exchange(process, exploding_exchange(), &stop))
            .catch_unwind()
            .await;

        let panic = result.err().expect("panic should be resumed");
        assert_eq!(panic.downcast_ref::<&str>(), Some(&"exchange blew up"));
        // The child was reaped before the panic resumed.
        assert!(!is_alive(pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_tears_down_child() {
        let process = sleeper();
        let pid = process.id().unwrap();
        let stop = CancellationToken::new();
        stop.cancel();

        let never = std::future::pending::<Result<InvocationOutcome, RpcError>>();
        let outcome = supervise_exchange(process, never, &stop).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Interrupted);
        assert!(!is_alive(pid));
    }

    #[test]
    fn force_also_stops() {
        let interrupt = Interrupt::new();
        interrupt.force();
        assert!(interrupt.stop.is_cancelled());
        assert!(interrupt.force.is_cancelled());
    }
}
