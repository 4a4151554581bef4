//! Function process supervision.
//!
//! The child is owned by a monitor task that waits for it to exit on its own
//! or for cancellation, whichever comes first. On cancellation the monitor
//! tears the child down and reaps it, so awaiting the monitor is enough to
//! know the child is gone.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::HarnessError;

/// Everything needed to start one function process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Environment variable that receives `port`.
    pub port_env: String,
    pub port: u16,
    /// SIGTERM-to-SIGKILL delay on teardown.
    pub shutdown_grace: Duration,
    /// Once cancelled, teardown skips or cuts short the grace period and
    /// kills the child outright.
    pub force: CancellationToken,
}

/// How the function process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exited after the harness asked it to.
    Terminated,
    /// Exited with status 0 without being asked.
    ExitedCleanly,
    /// Any other exit the harness did not ask for.
    Crashed(ExitStatus),
}

impl ChildExit {
    /// Classifies an exit status. The "termination requested" tag is
    /// checked first, so a child killed by the harness is never reported as
    /// a crash.
    pub fn classify(status: ExitStatus, requested: bool) -> Self {
        if requested {
            Self::Terminated
        } else if status.success() {
            Self::ExitedCleanly
        } else {
            Self::Crashed(status)
        }
    }

    /// The fault this exit represents, if any.
    pub fn into_fault(self) -> Option<HarnessError> {
        match self {
            Self::Terminated => None,
            Self::ExitedCleanly => Some(HarnessError::UnexpectedExit),
            Self::Crashed(status) => Some(HarnessError::Crashed { status }),
        }
    }
}

/// Handle to a running function process.
pub struct FunctionProcess {
    pid: Option<u32>,
    cancel: CancellationToken,
    requested: Arc<AtomicBool>,
    monitor: Option<JoinHandle<std::io::Result<ChildExit>>>,
    exit: Option<ChildExit>,
}

impl FunctionProcess {
    /// Starts the function with the port injected into its environment.
    ///
    /// stdin is closed; stdout and stderr both go to the harness's stderr so
    /// the harness's stdout carries nothing but the result payload.
    pub fn spawn(spec: &ProcessSpec) -> Result<Self, HarnessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .env(&spec.port_env, spec.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(std::io::stderr()))
            .stderr(Stdio::from(std::io::stderr()))
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            path: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(
            pid,
            program = %spec.program.display(),
            port = spec.port,
            "started function process"
        );

        let cancel = CancellationToken::new();
        let requested = Arc::new(AtomicBool::new(false));
        let monitor = tokio::spawn(supervise(
            child,
            cancel.clone(),
            spec.force.clone(),
            Arc::clone(&requested),
            spec.shutdown_grace,
        ));

        Ok(Self {
            pid,
            cancel,
            requested,
            monitor: Some(monitor),
            exit: None,
        })
    }

    /// OS process id, if the child had one when it was started.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Resolves once the child has exited.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// handle intact, so this can race other work in `tokio::select!`.
    pub async fn wait_exit(&mut self) -> Result<ChildExit, HarnessError> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let monitor = self.monitor.as_mut().ok_or(HarnessError::MonitorLost)?;
        let joined = monitor.await;
        self.monitor = None;

        let exit = joined
            .map_err(HarnessError::Monitor)?
            .map_err(HarnessError::Wait)?;
        self.exit = Some(exit);
        Ok(exit)
    }

    /// Tears the child down and waits until it has fully exited.
    ///
    /// If the child had already exited on its own, that exit is returned
    /// unchanged.
    pub async fn shutdown(mut self) -> Result<ChildExit, HarnessError> {
        if self.exit.is_none() {
            self.requested.store(true, Ordering::SeqCst);
            self.cancel.cancel();
        }
        self.wait_exit().await
    }
}

impl Drop for FunctionProcess {
    fn drop(&mut self) {
        if self.exit.is_none() && !self.cancel.is_cancelled() {
            debug!(pid = self.pid, "function process handle dropped, cancelling");
            self.requested.store(true, Ordering::SeqCst);
            self.cancel.cancel();
        }
    }
}

async fn supervise(
    mut child: Child,
    cancel: CancellationToken,
    force: CancellationToken,
    requested: Arc<AtomicBool>,
    grace: Duration,
) -> std::io::Result<ChildExit> {
    let exited = tokio::select! {
        status = child.wait() => Some(status?),
        () = cancel.cancelled() => None,
    };

    let exit = match exited {
        Some(status) => ChildExit::classify(status, requested.load(Ordering::SeqCst)),
        None => {
            requested.store(true, Ordering::SeqCst);
            let status = terminate(&mut child, grace, &force).await?;
            ChildExit::classify(status, true)
        }
    };
    debug!(?exit, "function process exited");
    Ok(exit)
}

/// SIGTERM, a grace period, then SIGKILL. A zero grace or a cancelled
/// `force` skips straight to SIGKILL, and `force` firing during the grace
/// period ends it early.
async fn terminate(
    child: &mut Child,
    grace: Duration,
    force: &CancellationToken,
) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if !grace.is_zero() && !force.is_cancelled() {
        if let Some(pid) = child.id() {
            // SAFETY: pid belongs to a child we spawned and have not reaped.
            let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if ret == 0 {
                tokio::select! {
                    waited = tokio::time::timeout(grace, child.wait()) => {
                        if let Ok(status) = waited {
                            return status;
                        }
                        debug!(pid, "function process ignored SIGTERM, sending SIGKILL");
                    }
                    () = force.cancelled() => {
                        debug!(pid, "forced shutdown, sending SIGKILL");
                    }
                }
            } else {
                warn!(pid, "SIGTERM failed, proceeding to SIGKILL");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = (grace, force);

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed, child has likely exited already");
    }
    child.wait().await
}
