//! Remote Store Operations
//!
//! Reads and compare-and-set writes against a key's home node travel as
//! ordinary distributed tasks, so they get the same two-phase acknowledgment
//! and retry behaviour as user tasks.

use super::types::{CasOutcome, VersionedBytes};
use crate::cluster::context::ClusterContext;
use crate::codec::wire::Wire;
use crate::membership::types::NodeId;
use crate::protocol::task::DTask;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fetches the raw entry for `key` from its home node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadEntryTask {
    pub key: String,
    pub found: Option<VersionedBytes>,
}

impl ReadEntryTask {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            found: None,
        }
    }
}

impl Wire for ReadEntryTask {
    const TYPE_ID: &'static str = "dtask.store.read";

    fn restore(&mut self, remote: Self) {
        self.found = remote.found;
    }
}

#[async_trait]
impl DTask for ReadEntryTask {
    async fn dinvoke(&mut self, ctx: &ClusterContext, sender: &NodeId) -> anyhow::Result<()> {
        if !ctx.partitioner.is_home(&self.key) {
            tracing::warn!(
                "{:?} read '{}' here, but its home is {:?}",
                sender,
                self.key,
                ctx.partitioner.home_node(&self.key)
            );
        }
        self.found = ctx.store.get(&self.key);
        Ok(())
    }

    fn log_verbose(&self) -> bool {
        false
    }
}

/// Applies a compare-and-set on the home node of `key`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareAndSetTask {
    pub key: String,
    pub expected_version: u64,
    pub type_id: String,
    pub bytes: Vec<u8>,
    pub outcome: Option<CasOutcome>,
}

impl CompareAndSetTask {
    pub fn new(key: &str, expected_version: u64, type_id: &str, bytes: Vec<u8>) -> Self {
        Self {
            key: key.to_string(),
            expected_version,
            type_id: type_id.to_string(),
            bytes,
            outcome: None,
        }
    }
}

impl Wire for CompareAndSetTask {
    const TYPE_ID: &'static str = "dtask.store.cas";

    fn restore(&mut self, remote: Self) {
        self.outcome = remote.outcome;
    }
}

#[async_trait]
impl DTask for CompareAndSetTask {
    async fn dinvoke(&mut self, ctx: &ClusterContext, _sender: &NodeId) -> anyhow::Result<()> {
        // The reply only needs the outcome.
        let bytes = std::mem::take(&mut self.bytes);
        self.outcome = Some(ctx.store.compare_and_set(
            &self.key,
            self.expected_version,
            &self.type_id,
            bytes,
        ));
        Ok(())
    }

    fn log_verbose(&self) -> bool {
        false
    }
}
