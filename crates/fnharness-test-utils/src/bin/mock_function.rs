//! Stand-alone mock function process.
//!
//! Listens on the port named by `_LAMBDA_SERVER_PORT` and behaves according
//! to its first argument, or `MOCK_FUNCTION_MODE` when there is none:
//!
//! - `echo` (default): return the payload unchanged
//! - `fail`: report the sample `boom` error
//! - `crash-on-invoke`: exit with status 3 instead of replying
//! - `slow-start`: wait before listening, then echo
//! - `reject-pings`: reject the first few pings, then echo

use std::time::Duration;

use fnharness_test_utils::{MockFunction, sample_error};
use tokio::net::TcpListener;

const PORT_ENV: &str = "_LAMBDA_SERVER_PORT";
const MODE_ENV: &str = "MOCK_FUNCTION_MODE";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let port: u16 = match std::env::var(PORT_ENV).ok().and_then(|p| p.parse().ok()) {
        Some(port) => port,
        None => {
            eprintln!("mock-function: {PORT_ENV} must be set to a port number");
            std::process::exit(64);
        }
    };
    let mode = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(MODE_ENV).ok())
        .unwrap_or_else(|| "echo".to_owned());

    let mock = match mode.as_str() {
        "echo" => MockFunction::echo(),
        "fail" => MockFunction::failing(sample_error()),
        "crash-on-invoke" => MockFunction::new(|_| std::process::exit(3)),
        "slow-start" => {
            tokio::time::sleep(Duration::from_millis(200)).await;
            MockFunction::echo()
        }
        "reject-pings" => MockFunction::echo().reject_pings(5),
        other => {
            eprintln!("mock-function: unknown mode {other:?}");
            std::process::exit(64);
        }
    };

    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("mock-function: failed to listen on port {port}: {e}");
            std::process::exit(65);
        }
    };
    tracing::info!(port, mode = %mode, "mock function listening");
    mock.serve(listener).await;
}
