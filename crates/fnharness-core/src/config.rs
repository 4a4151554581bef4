use std::time::Duration;

/// Environment variable the function runtime reads its listen port from.
pub const DEFAULT_PORT_ENV: &str = "_LAMBDA_SERVER_PORT";

/// Tunables for one harness run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Name of the environment variable carrying the port to the child.
    pub port_env: String,
    /// Delay between handshake attempts. Constant, no backoff.
    pub poll_interval: Duration,
    /// Offset from "now" used for the invocation deadline.
    pub deadline_window: Duration,
    /// How long to wait after SIGTERM before SIGKILL. Zero kills at once.
    pub shutdown_grace: Duration,
}

impl HarnessConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
    pub const DEFAULT_DEADLINE_WINDOW: Duration = Duration::from_secs(60 * 60);
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            port_env: DEFAULT_PORT_ENV.to_owned(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            deadline_window: Self::DEFAULT_DEADLINE_WINDOW,
            shutdown_grace: Duration::ZERO,
        }
    }
}
