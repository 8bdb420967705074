use super::context::ClusterContext;
use crate::atomic::engine::AtomicEngine;
use crate::atomic::types::{Atomic, AtomicOutcome};
use crate::codec::registry::TypeRegistry;
use crate::codec::wire::AtomicValue;
use crate::config::ClusterConfig;
use crate::error::TaskError;
use crate::membership::directory::NodeDirectory;
use crate::membership::types::NodeId;
use crate::protocol::handle::TaskHandle;
use crate::protocol::rpc::TaskProtocol;
use crate::protocol::task::DTask;
use crate::protocol::types::{Envelope, ProtocolStatsSnapshot};
use crate::storage::memory::VersionedStore;
use crate::storage::protocol::{CompareAndSetTask, ReadEntryTask};
use crate::transport::types::Transport;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A cluster member: context, task protocol and atomic engine wired together.
pub struct ClusterNode {
    ctx: Arc<ClusterContext>,
    protocol: Arc<TaskProtocol>,
    atomic: AtomicEngine,
}

impl ClusterNode {
    pub fn new(
        config: ClusterConfig,
        directory: Arc<NodeDirectory>,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, TaskError> {
        let registry = TypeRegistry::new();
        registry.register_task::<ReadEntryTask>()?;
        registry.register_task::<CompareAndSetTask>()?;

        let ctx = ClusterContext::new(config, directory, registry, transport);
        let protocol = TaskProtocol::new(ctx.clone());
        let atomic = AtomicEngine::new(ctx.clone(), protocol.clone());

        tracing::info!(
            "Node {:?} ready, {} members, owns {} partitions",
            ctx.local_id(),
            ctx.directory.len(),
            ctx.partitioner.my_partitions().len()
        );

        Ok(Arc::new(Self {
            ctx,
            protocol,
            atomic,
        }))
    }

    /// Spawns the dispatcher feeding inbound frames to the protocol.
    pub fn start(self: &Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Envelope>) -> JoinHandle<()> {
        let protocol = self.protocol.clone();
        let local = self.local_id().clone();

        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                protocol.handle_envelope(envelope);
            }
            tracing::info!("Inbox of {:?} closed, dispatcher stopped", local);
        })
    }

    pub fn register_task<T: DTask>(&self) -> Result<(), TaskError> {
        Ok(self.ctx.registry.register_task::<T>()?)
    }

    pub fn register_value<V: AtomicValue>(&self) -> Result<(), TaskError> {
        Ok(self.ctx.registry.register_value::<V>()?)
    }

    pub fn submit<T: DTask>(&self, target: &NodeId, task: T) -> Result<TaskHandle<T>, TaskError> {
        self.protocol.submit(target, task)
    }

    pub async fn atomic_update<V, F>(&self, key: &str, f: F) -> Result<AtomicOutcome, TaskError>
    where
        V: AtomicValue,
        F: Fn(Option<V>) -> anyhow::Result<Option<V>> + Send + Sync,
    {
        self.atomic.atomic_update(key, f).await
    }

    pub async fn apply<A: Atomic>(&self, key: &str, op: &A) -> Result<AtomicOutcome, TaskError> {
        self.atomic.apply(key, op).await
    }

    /// Reads `key` from its home node, decoded into a fresh instance.
    pub async fn read<V: AtomicValue>(&self, key: &str) -> Result<Option<(V, u64)>, TaskError> {
        self.atomic.read(key).await
    }

    pub fn home_node(&self, key: &str) -> NodeId {
        self.ctx.partitioner.home_node(key)
    }

    pub fn local_id(&self) -> &NodeId {
        self.ctx.local_id()
    }

    pub fn context(&self) -> &Arc<ClusterContext> {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.ctx.store
    }

    pub fn protocol(&self) -> &Arc<TaskProtocol> {
        &self.protocol
    }

    pub fn stats(&self) -> ProtocolStatsSnapshot {
        self.protocol.stats()
    }
}
