use crate::codec::registry::TypeRegistry;
use crate::config::ClusterConfig;
use crate::membership::directory::NodeDirectory;
use crate::membership::types::NodeId;
use crate::storage::memory::VersionedStore;
use crate::storage::partitioner::PartitionManager;
use crate::transport::types::Transport;

use std::sync::Arc;

/// Everything a running task may touch on the node it executes on.
///
/// Passed explicitly to `dinvoke` instead of living in process globals, so
/// several nodes can share one process.
pub struct ClusterContext {
    pub directory: Arc<NodeDirectory>,
    pub registry: Arc<TypeRegistry>,
    pub partitioner: Arc<PartitionManager>,
    pub store: Arc<VersionedStore>,
    pub transport: Arc<dyn Transport>,
    pub config: ClusterConfig,
}

impl ClusterContext {
    pub fn new(
        config: ClusterConfig,
        directory: Arc<NodeDirectory>,
        registry: Arc<TypeRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let partitioner = Arc::new(PartitionManager::new(directory.clone()));
        let store = VersionedStore::new(partitioner.clone());

        Arc::new(Self {
            directory,
            registry,
            partitioner,
            store,
            transport,
            config,
        })
    }

    pub fn local_id(&self) -> &NodeId {
        self.directory.local_id()
    }
}
