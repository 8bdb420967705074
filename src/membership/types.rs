use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Stable identity of a cluster member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Offset between a node's datagram port and its HTTP port.
pub const HTTP_PORT_OFFSET: u16 = 1000;

/// A single member of the node directory.
///
/// Each node listens for unreliable datagrams on `udp_addr` and for
/// reliable stream frames (HTTP over TCP) on `http_addr`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub udp_addr: SocketAddr,
    pub http_addr: SocketAddr,
}

impl Node {
    pub fn new(id: NodeId, udp_addr: SocketAddr, http_addr: SocketAddr) -> Self {
        Self {
            id,
            udp_addr,
            http_addr,
        }
    }

    /// Derives the HTTP address from the datagram address (`port + 1000`).
    pub fn from_bind(id: NodeId, udp_addr: SocketAddr) -> Self {
        let http_addr = SocketAddr::new(
            udp_addr.ip(),
            udp_addr.port().saturating_add(HTTP_PORT_OFFSET),
        );
        Self::new(id, udp_addr, http_addr)
    }
}
