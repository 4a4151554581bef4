use std::path::PathBuf;
use std::process::ExitStatus;

use fnharness_wire::RpcError;
use thiserror::Error;

use crate::report::{EXIT_HARNESS_FAULT, EXIT_UNEXPECTED_EXIT};

/// Faults in the harness machinery itself, as opposed to errors the
/// function reports through its response.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No local TCP port could be reserved.
    #[error("failed to allocate a local port")]
    PortAllocation(#[source] std::io::Error),

    /// The function executable could not be started.
    #[error("failed to start function process {}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The function exited with status 0 before the harness asked it to.
    #[error("function process finished unexpectedly")]
    UnexpectedExit,

    /// The function exited with a failure status or was killed by a signal
    /// the harness did not send.
    #[error("function process crashed ({status})")]
    Crashed { status: ExitStatus },

    /// Waiting on the child failed at the OS level.
    #[error("failed to wait for function process")]
    Wait(#[source] std::io::Error),

    /// The task supervising the child panicked or was aborted.
    #[error("function process monitor failed")]
    Monitor(#[source] tokio::task::JoinError),

    /// The supervising task went away without reporting an exit.
    #[error("function process monitor stopped without reporting an exit")]
    MonitorLost,

    /// The RPC exchange with the function failed.
    #[error("rpc exchange with function process failed")]
    Rpc(#[source] RpcError),
}

impl HarnessError {
    /// Process exit status the CLI should use for this fault.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::UnexpectedExit => EXIT_UNEXPECTED_EXIT,
            _ => EXIT_HARNESS_FAULT,
        }
    }
}

impl From<RpcError> for HarnessError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}
