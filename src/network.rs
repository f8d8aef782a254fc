//! Network join check
//!
//! The node cannot do anything without a routable IPv4 address. On hosts
//! with a managed network stack this only verifies connectivity; joining
//! a network (captive portal, access point mode) happens outside the node.

use crate::error::{NodeError, Result};
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::{error, info};

/// Any routable address works; connecting a UDP socket sends nothing
pub const DEFAULT_PROBE_TARGET: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 80);

/// Local IPv4 address the kernel would use to reach `probe`
pub fn local_ipv4(probe: SocketAddrV4) -> Result<Ipv4Addr> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket
        .connect(&SocketAddr::V4(probe).into())
        .map_err(|e| NodeError::network_join(format!("No route to {probe}: {e}")))?;

    socket
        .local_addr()?
        .as_socket_ipv4()
        .map(|addr| *addr.ip())
        .ok_or_else(|| NodeError::network_join("Socket has no IPv4 address"))
}

/// Whether the host holds a usable address towards `probe`
pub fn connected_via(probe: SocketAddrV4) -> Result<Ipv4Addr> {
    let address = local_ipv4(probe)?;
    if address.is_unspecified() || address.is_loopback() || address.is_link_local() {
        return Err(NodeError::network_join(format!("Only {address} is available")));
    }
    Ok(address)
}

/// Network-join collaborator; `false` is fatal for the process
pub fn ensure_connected(ap_name: &str) -> bool {
    match connected_via(DEFAULT_PROBE_TARGET) {
        Ok(address) => {
            info!("Node {ap_name} online at {address}");
            true
        }
        Err(e) => {
            error!("Node {ap_name} has no network: {e}");
            false
        }
    }
}
