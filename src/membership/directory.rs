use dashmap::DashMap;
use std::sync::Arc;

use super::types::{Node, NodeId};

/// Static view of the cluster members, including the local node.
pub struct NodeDirectory {
    pub local_node: Node,
    members: DashMap<NodeId, Node>,
}

impl NodeDirectory {
    pub fn new(local_node: Node, peers: Vec<Node>) -> Arc<Self> {
        let members = DashMap::new();
        members.insert(local_node.id.clone(), local_node.clone());
        for peer in peers {
            if peer.id == local_node.id {
                continue;
            }
            members.insert(peer.id.clone(), peer);
        }

        tracing::info!(
            "Node directory for {:?} holds {} members",
            local_node.id,
            members.len()
        );

        Arc::new(Self {
            local_node,
            members,
        })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_node.id
    }

    pub fn is_local(&self, id: &NodeId) -> bool {
        &self.local_node.id == id
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    /// Adds or replaces a member. Used when the directory is assembled
    /// incrementally (tests, late-bound ports).
    pub fn upsert(&self, node: Node) {
        self.members.insert(node.id.clone(), node);
    }

    /// All member ids sorted, so every node derives the same ordering.
    pub fn sorted_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.members.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
