use std::net::SocketAddr;
use std::time::Duration;

use fnharness_wire::Client;
use fnharness_wire::messages::{PING_METHOD, PingRequest, PingResponse};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// RPC client connected to a function process.
pub type RpcClient = Client<TcpStream>;

/// Waits until the function at `addr` answers `Function.Ping`.
///
/// Two phases, both retried every `poll_interval` without limit: connect,
/// then ping. A ping rejected by the server is retried on the same
/// connection; a ping that breaks the connection sends the loop back to the
/// connect phase.
pub async fn handshake(addr: SocketAddr, poll_interval: Duration) -> RpcClient {
    let mut attempts = 0u64;
    loop {
        let mut client = connect(addr, poll_interval, &mut attempts).await;
        loop {
            attempts += 1;
            match client.call::<_, PingResponse>(PING_METHOD, &PingRequest).await {
                Ok(_) => {
                    debug!(%addr, attempts, "function process is ready");
                    return client;
                }
                Err(e) if e.is_transport() => {
                    trace!(error = %e, "ping broke the connection, reconnecting");
                    tokio::time::sleep(poll_interval).await;
                    break;
                }
                Err(e) => {
                    trace!(error = %e, "ping rejected, retrying");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

async fn connect(addr: SocketAddr, poll_interval: Duration, attempts: &mut u64) -> RpcClient {
    loop {
        *attempts += 1;
        match RpcClient::connect(addr).await {
            Ok(client) => return client,
            Err(e) => {
                trace!(%addr, error = %e, "function not accepting connections yet");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
