//! In-process clusters for tests.

use super::node::ClusterNode;
use crate::config::{ClusterConfig, ProtocolConfig};
use crate::membership::directory::NodeDirectory;
use crate::membership::types::{Node, NodeId};
use crate::transport::memory::MemoryNetwork;
use crate::transport::types::Reliability;

use std::net::SocketAddr;
use std::sync::Arc;

pub struct TestCluster {
    pub network: Arc<MemoryNetwork>,
    pub nodes: Vec<Arc<ClusterNode>>,
}

impl TestCluster {
    pub fn node(&self, index: usize) -> &Arc<ClusterNode> {
        &self.nodes[index]
    }

    pub fn id(&self, index: usize) -> NodeId {
        self.nodes[index].local_id().clone()
    }
}

/// Protocol settings small enough for paused-clock tests.
pub fn fast_protocol() -> ProtocolConfig {
    ProtocolConfig {
        ack_timeout_ms: 100,
        max_retransmits: 4,
        max_wait_extensions: 10,
        ..ProtocolConfig::default()
    }
}

/// Builds `size` nodes named `node-0`, `node-1`, ... on one memory network.
pub fn memory_cluster(size: usize, reliability: Reliability, protocol: ProtocolConfig) -> TestCluster {
    let mut config = ClusterConfig::default();
    config.protocol = protocol;
    config.atomic.jitter_ms = 0;
    memory_cluster_with(size, reliability, config)
}

pub fn memory_cluster_with(size: usize, reliability: Reliability, config: ClusterConfig) -> TestCluster {
    let network = MemoryNetwork::new();
    let members: Vec<Node> = (0..size)
        .map(|i| {
            let udp: SocketAddr = format!("127.0.0.1:{}", 20_000 + i).parse().unwrap();
            Node::from_bind(NodeId(format!("node-{}", i)), udp)
        })
        .collect();

    let nodes = members
        .iter()
        .map(|local| {
            let directory = NodeDirectory::new(local.clone(), members.clone());
            let (transport, inbox) = network.attach(local.id.clone(), reliability);
            let node = ClusterNode::new(config.clone(), directory, transport).unwrap();
            node.start(inbox);
            node
        })
        .collect();

    TestCluster { network, nodes }
}

/// A key whose home node is `target`.
pub fn key_homed_on(node: &ClusterNode, target: &NodeId, prefix: &str) -> String {
    (0..)
        .map(|i| format!("{}-{}", prefix, i))
        .find(|key| &node.home_node(key) == target)
        .unwrap()
}
