use crate::membership::directory::NodeDirectory;
use crate::membership::types::NodeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Maps keys to partitions and partitions to their home node.
pub struct PartitionManager {
    pub num_partitions: u32,
    directory: Arc<NodeDirectory>,
}

impl PartitionManager {
    pub fn new(directory: Arc<NodeDirectory>) -> Self {
        Self {
            num_partitions: 256,
            directory,
        }
    }

    pub fn get_partition(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_partitions
    }

    pub fn partition_owner(&self, partition: u32) -> NodeId {
        let node_ids = self.directory.sorted_ids();
        if node_ids.is_empty() {
            return self.directory.local_id().clone();
        }
        node_ids[(partition as usize) % node_ids.len()].clone()
    }

    /// The node whose store holds `key`.
    pub fn home_node(&self, key: &str) -> NodeId {
        self.partition_owner(self.get_partition(key))
    }

    pub fn is_home(&self, key: &str) -> bool {
        self.directory.is_local(&self.home_node(key))
    }

    pub fn my_partitions(&self) -> Vec<u32> {
        let my_id = self.directory.local_id();

        (0..self.num_partitions)
            .filter(|&partition| &self.partition_owner(partition) == my_id)
            .collect()
    }
}
