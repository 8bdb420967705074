//! Node Configuration
//!
//! Loaded from a TOML file. Every section and field has a default, so an
//! empty file (or no file at all) yields a single-node setup on
//! `127.0.0.1:5000`.
//!
//! ```toml
//! log_level = "info"
//!
//! [node]
//! id = "node-a"
//! bind = "127.0.0.1:5000"
//!
//! [[peers]]
//! id = "node-b"
//! bind = "127.0.0.1:5001"
//!
//! [protocol]
//! ack_timeout_ms = 1000
//! max_retransmits = 8
//!
//! [atomic]
//! max_retries = 128
//! ```

use crate::membership::types::{Node, NodeId};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    pub node: NodeConfig,
    pub peers: Vec<PeerConfig>,
    pub protocol: ProtocolConfig,
    pub atomic: AtomicConfig,
    pub log_level: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            peers: Vec::new(),
            protocol: ProtocolConfig::default(),
            atomic: AtomicConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Generated when left empty.
    pub id: Option<String>,
    /// Datagram address; the HTTP address defaults to `port + 1000`.
    pub bind: SocketAddr,
    pub http: Option<SocketAddr>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            http: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerConfig {
    pub id: String,
    pub bind: SocketAddr,
    #[serde(default)]
    pub http: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Must be at least 1.
    pub ack_timeout_ms: u64,
    pub max_retransmits: u32,
    pub max_wait_extensions: u32,
    /// Concurrent `dinvoke` executions on this node.
    pub worker_count: usize,
    /// Frames above this size use the stream transport.
    pub datagram_limit: usize,
    pub http_timeout_ms: u64,
    /// Closed-call tombstones kept; past this the older half is evicted.
    pub closed_call_retention: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1000,
            max_retransmits: 8,
            max_wait_extensions: 30,
            worker_count: 4,
            datagram_limit: 1400,
            http_timeout_ms: 5000,
            closed_call_retention: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtomicConfig {
    /// `0` retries until the update commits.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_ms: u64,
}

impl Default for AtomicConfig {
    fn default() -> Self {
        Self {
            max_retries: 128,
            backoff_base_ms: 1,
            backoff_max_ms: 64,
            jitter_ms: 5,
        }
    }
}

impl ClusterConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: ClusterConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.protocol.ack_timeout_ms == 0 {
            anyhow::bail!("protocol.ack_timeout_ms must be at least 1");
        }
        if self.protocol.closed_call_retention == 0 {
            anyhow::bail!("protocol.closed_call_retention must be at least 1");
        }
        Ok(())
    }

    pub fn local_node(&self) -> Node {
        let id = match &self.node.id {
            Some(id) if !id.is_empty() => NodeId(id.clone()),
            _ => NodeId::new(),
        };
        node_of(id, self.node.bind, self.node.http)
    }

    pub fn peer_nodes(&self) -> Vec<Node> {
        self.peers
            .iter()
            .map(|peer| node_of(NodeId(peer.id.clone()), peer.bind, peer.http))
            .collect()
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn node_of(id: NodeId, bind: SocketAddr, http: Option<SocketAddr>) -> Node {
    match http {
        Some(http_addr) => Node::new(id, bind, http_addr),
        None => Node::from_bind(id, bind),
    }
}
