//! Distributed Task Definition
//!
//! A [`DTask`] is serialized on the originating node, executed on the target
//! with [`DTask::dinvoke`], serialized back, and decoded *into the original
//! instance* on the originator before [`DTask::on_ack`] runs. Finally the
//! target runs [`DTask::on_ack_ack`] on its own copy.

use crate::cluster::context::ClusterContext;
use crate::codec::wire::Wire;
use crate::error::{RemoteFailure, TaskError};
use crate::membership::types::NodeId;

use super::types::{ReleaseFn, RemoteOutcome, Reply};

use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait DTask: Wire + Sync {
    /// Runs on the target node. Mutate `self` into the result.
    ///
    /// An `Err` (or a panic) is carried back to the originator as an
    /// application failure.
    async fn dinvoke(&mut self, ctx: &ClusterContext, sender: &NodeId) -> anyhow::Result<()>;

    /// Runs on the originator after the result was merged into this instance.
    /// Transient fields set before submission are still present.
    fn on_ack(&mut self) {}

    /// Runs on the originator instead of `on_ack` when the round trip failed.
    fn on_failure(&mut self, _error: &TaskError) {}

    /// Runs on the target once the originator confirmed it processed the result.
    fn on_ack_ack(&mut self) {}

    /// Return `false` to silence the per-call debug lines.
    fn log_verbose(&self) -> bool {
        true
    }
}

/// Runs `dinvoke` on its own tokio task so a panic is reported instead of
/// tearing down the caller.
pub(crate) async fn invoke_guarded<T: DTask>(
    mut task: T,
    ctx: Arc<ClusterContext>,
    sender: NodeId,
) -> Result<(T, anyhow::Result<()>), String> {
    let handle = tokio::spawn(async move {
        let result = task.dinvoke(&ctx, &sender).await;
        (task, result)
    });

    handle.await.map_err(|e| {
        if e.is_panic() {
            let payload = e.into_panic();
            if let Some(msg) = payload.downcast_ref::<&str>() {
                format!("dinvoke panicked: {}", msg)
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                format!("dinvoke panicked: {}", msg)
            } else {
                "dinvoke panicked".to_string()
            }
        } else {
            "dinvoke was cancelled".to_string()
        }
    })
}

/// Executing side of a call: decode, run, encode the reply and keep the
/// instance around for `on_ack_ack`.
pub(crate) async fn execute_decoded<T: DTask>(
    payload: Vec<u8>,
    sender: NodeId,
    ctx: Arc<ClusterContext>,
) -> RemoteOutcome {
    let task = match T::decode(&payload) {
        Ok(task) => task,
        Err(e) => {
            tracing::error!("Rejecting request from {:?}: {}", sender, e);
            return RemoteOutcome::failed(RemoteFailure::Contract(e.to_string()));
        }
    };

    if task.log_verbose() {
        tracing::debug!("Executing {} for {:?}", T::TYPE_ID, sender);
    }

    match invoke_guarded(task, ctx, sender).await {
        Ok((task, Ok(()))) => match task.encode() {
            Ok(bytes) => RemoteOutcome {
                reply: Reply::Done(bytes),
                release: Some(release_with(task)),
            },
            Err(e) => RemoteOutcome {
                reply: Reply::Failed(RemoteFailure::Contract(e.to_string())),
                release: Some(release_with(task)),
            },
        },
        Ok((task, Err(e))) => {
            tracing::warn!("{} failed: {:#}", T::TYPE_ID, e);
            RemoteOutcome {
                reply: Reply::Failed(RemoteFailure::Application(format!("{:#}", e))),
                release: Some(release_with(task)),
            }
        }
        Err(panic) => {
            tracing::error!("{}: {}", T::TYPE_ID, panic);
            RemoteOutcome::failed(RemoteFailure::Application(panic))
        }
    }
}

fn release_with<T: DTask>(task: T) -> ReleaseFn {
    Box::new(move || {
        let mut task = task;
        task.on_ack_ack();
    })
}
