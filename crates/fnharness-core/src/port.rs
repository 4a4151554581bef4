use std::net::{Ipv4Addr, TcpListener};

use crate::error::HarnessError;

/// Asks the OS for a free TCP port on the loopback interface.
///
/// The listener is closed before returning, so another process may take the
/// port before the function binds it. That window is accepted.
pub fn allocate_port() -> Result<u16, HarnessError> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(HarnessError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(HarnessError::PortAllocation)?
        .port();
    tracing::debug!(port, "allocated function port");
    Ok(port)
}
