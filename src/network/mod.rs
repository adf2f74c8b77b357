//! Network endpoints and the ARQ engines
//!
//! This module owns the UDP sockets and drives the request/reply exchange:
//! the client retries on timeout, the server rejects duplicate and
//! out-of-order packets and answers access requests from the subscriber store.

mod client;
mod server;

pub use self::client::{Client, Outcome};
pub use self::server::{check_sequence, Server, ServerState};

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::core::{Error, Result};

/// Creates a non-blocking IPv4 UDP socket bound to `addr` and registers it
/// with the tokio runtime
pub(crate) fn bind_udp(addr: SocketAddr, recv_buffer_size: Option<usize>) -> Result<UdpSocket> {
    if !addr.is_ipv4() {
        return Err(Error::config(format!("IPv4 address required, got {}", addr)));
    }

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::network(format!("Failed to create socket: {}", e)))?;
    socket.set_reuse_address(true)?;
    if let Some(size) = recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::network(format!("Failed to bind socket to {}: {}", addr, e)))?;

    Ok(UdpSocket::from_std(socket.into())?)
}
