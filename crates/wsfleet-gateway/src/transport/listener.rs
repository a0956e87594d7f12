//! Shared-port listener.
//!
//! Every worker binds the same address with `SO_REUSEPORT`; the kernel spreads
//! accepted connections across the bound workers.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use wsfleet_core::error::{FleetError, Result};

const BACKLOG: u32 = 1024;

/// Resolve `addr` and bind a reusable listener on the first result.
pub async fn bind_shared(addr: &str) -> Result<TcpListener> {
    let resolved = tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| FleetError::Config(format!("listen address {addr} did not resolve")))?;
    bind_shared_addr(resolved)
}

pub fn bind_shared_addr(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(BACKLOG)?)
}
