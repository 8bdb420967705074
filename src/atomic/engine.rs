use super::types::{Atomic, AtomicOutcome, AtomicPolicy};
use crate::cluster::context::ClusterContext;
use crate::codec::wire::AtomicValue;
use crate::error::{CodecError, TaskError};
use crate::membership::types::NodeId;
use crate::protocol::rpc::TaskProtocol;
use crate::storage::protocol::{CompareAndSetTask, ReadEntryTask};
use crate::storage::types::{ABSENT_VERSION, CasOutcome};

use std::sync::Arc;

pub struct AtomicEngine {
    ctx: Arc<ClusterContext>,
    protocol: Arc<TaskProtocol>,
    policy: AtomicPolicy,
}

impl AtomicEngine {
    pub fn new(ctx: Arc<ClusterContext>, protocol: Arc<TaskProtocol>) -> Self {
        let policy = AtomicPolicy::from(&ctx.config.atomic);
        Self {
            ctx,
            protocol,
            policy,
        }
    }

    /// Applies `f` to the current value of `key` and commits the result with
    /// a compare-and-set, retrying on conflict.
    ///
    /// `f` gets `None` for an absent key and returns `Ok(None)` to skip the
    /// write. An `Err` from `f` aborts the update as an application failure.
    pub async fn atomic_update<V, F>(&self, key: &str, f: F) -> Result<AtomicOutcome, TaskError>
    where
        V: AtomicValue,
        F: Fn(Option<V>) -> anyhow::Result<Option<V>> + Send + Sync,
    {
        self.ctx.registry.ensure_value::<V>()?;

        let home = self.ctx.partitioner.home_node(key);
        let mut retries = 0u32;

        loop {
            let attempts = retries + 1;
            let (old, version) = self.read_for_update::<V>(&home, key).await?;

            let new = f(old).map_err(|e| {
                tracing::debug!("Update function for '{}' failed: {:#}", key, e);
                TaskError::ApplicationFailure(format!("{:#}", e))
            })?;

            let Some(new) = new else {
                tracing::trace!("Update of '{}' declined at version {}", key, version);
                return Ok(AtomicOutcome::Unchanged { attempts });
            };

            match self.write_if_version(&home, key, version, new).await? {
                CasOutcome::Committed { version } => {
                    if retries > 0 {
                        tracing::debug!(
                            "Committed '{}' at version {} after {} retries",
                            key,
                            version,
                            retries
                        );
                    }
                    return Ok(AtomicOutcome::Committed { version, attempts });
                }
                CasOutcome::Conflict { current } => {
                    if self.policy.exhausted(retries) {
                        tracing::warn!(
                            "Giving up on '{}' after {} attempts (version now {})",
                            key,
                            attempts,
                            current
                        );
                        return Err(TaskError::RetriesExhausted {
                            key: key.to_string(),
                            attempts,
                        });
                    }
                    retries += 1;
                    let delay = self.policy.backoff(retries);
                    tracing::trace!(
                        "Conflict on '{}': read {}, now {}; retrying in {:?}",
                        key,
                        version,
                        current,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// [`atomic_update`](Self::atomic_update) driven by an [`Atomic`] object.
    pub async fn apply<A: Atomic>(&self, key: &str, op: &A) -> Result<AtomicOutcome, TaskError> {
        self.atomic_update::<A::Value, _>(key, |old| op.atomic(old))
            .await
    }

    /// Current value and version of `key`, as an independent instance.
    pub async fn read<V: AtomicValue>(&self, key: &str) -> Result<Option<(V, u64)>, TaskError> {
        self.ctx.registry.ensure_value::<V>()?;
        let home = self.ctx.partitioner.home_node(key);
        match self.read_for_update::<V>(&home, key).await? {
            (Some(value), version) => Ok(Some((value, version))),
            (None, _) => Ok(None),
        }
    }

    async fn read_for_update<V: AtomicValue>(
        &self,
        home: &NodeId,
        key: &str,
    ) -> Result<(Option<V>, u64), TaskError> {
        if self.ctx.directory.is_local(home) {
            // The cached instance is shared with every other reader.
            return Ok(match self.ctx.store.get_typed::<V>(key)? {
                Some((cached, version)) => (Some(cached.deep_copy()), version),
                None => (None, ABSENT_VERSION),
            });
        }

        let task = self.protocol.submit(home, ReadEntryTask::new(key))?.await?;
        match task.found {
            None => Ok((None, ABSENT_VERSION)),
            Some(entry) => {
                if entry.type_id != V::TYPE_ID {
                    return Err(CodecError::TypeMismatch {
                        stored: entry.type_id,
                        requested: V::TYPE_ID.to_string(),
                    }
                    .into());
                }
                // Freshly decoded, so already private to this round.
                let value = V::decode(&entry.bytes)?;
                Ok((Some(value), entry.version))
            }
        }
    }

    async fn write_if_version<V: AtomicValue>(
        &self,
        home: &NodeId,
        key: &str,
        expected: u64,
        value: V,
    ) -> Result<CasOutcome, TaskError> {
        if self.ctx.directory.is_local(home) {
            return Ok(self.ctx.store.compare_and_set_typed(key, expected, value)?);
        }

        let bytes = value.encode()?;
        let task = CompareAndSetTask::new(key, expected, V::TYPE_ID, bytes);
        let task = self.protocol.submit(home, task)?.await?;
        task.outcome.ok_or_else(|| {
            TaskError::ContractViolation(format!("compare-and-set of '{}' returned no outcome", key))
        })
    }
}
