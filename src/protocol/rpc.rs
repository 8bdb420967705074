//! Round-Trip Engine
//!
//! Drives both ends of a remote call:
//!
//! 1. **Originator** sends `Request`, waits for `Ack` (resending or extending
//!    per [`RetryPolicy`]), decodes the result into the original task, runs
//!    `on_ack`, then sends `AckAck` and completes the caller's handle. The call
//!    stays tracked until the `AckAck` is out, so a resent `Ack` arriving
//!    mid-`on_ack` is dropped rather than confirmed early.
//! 2. **Target** executes the task once per `(origin, task_num)`, sends `Ack`
//!    and retains it until `AckAck` arrives, then runs `on_ack_ack` and
//!    leaves a tombstone so late duplicates are ignored.
//!
//! While `dinvoke` runs, a duplicate `Request` or a `Poll` is answered with
//! `Working`. The originator then treats the request as delivered: it stops
//! resending, extends its wait, and polls once per timeout. Each `Working`
//! refreshes the extension budget, so a live computation never times out.

use super::handle::TaskHandle;
use super::retry::{RetryAction, RetryBudget, RetryPolicy};
use super::task::{DTask, invoke_guarded};
use super::types::{
    Envelope, Frame, ProtocolStats, ProtocolStatsSnapshot, ReleaseFn, RemoteOutcome, Reply,
    StateCell, TaskState,
};
use crate::cluster::context::ClusterContext;
use crate::error::{RemoteFailure, TaskError};
use crate::membership::types::NodeId;
use crate::transport::types::Reliability;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, Semaphore, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CallKey {
    origin: NodeId,
    task_num: u64,
}

/// Originator-side record of a call, kept until its `AckAck` is sent.
struct PendingCall {
    target: NodeId,
    /// Taken by the first `Ack`; `None` while that result is processed.
    ack_tx: Option<oneshot::Sender<Reply>>,
    working: Arc<Notify>,
}

/// Target-side record of a call.
enum RemoteCall {
    Executing,
    Replied {
        ack: Envelope,
        release: Option<ReleaseFn>,
        ackack_tx: Option<oneshot::Sender<()>>,
        state: StateCell,
    },
}

pub struct TaskProtocol {
    ctx: Arc<ClusterContext>,
    policy: RetryPolicy,
    next_task_num: AtomicU64,
    pending: DashMap<u64, PendingCall>,
    remote: DashMap<CallKey, RemoteCall>,
    /// Tombstones, stamped with their close sequence number.
    closed: DashMap<CallKey, u64>,
    close_seq: AtomicU64,
    closed_retention: usize,
    workers: Arc<Semaphore>,
    stats: ProtocolStats,
}

impl TaskProtocol {
    pub fn new(ctx: Arc<ClusterContext>) -> Arc<Self> {
        let config = &ctx.config.protocol;
        let policy = RetryPolicy::from(config);
        let workers = Arc::new(Semaphore::new(config.worker_count.max(1)));
        let closed_retention = config.closed_call_retention;

        tracing::info!(
            "Task protocol on {:?}: ack timeout {:?}, {} workers",
            ctx.local_id(),
            policy.ack_timeout,
            config.worker_count.max(1)
        );

        Arc::new(Self {
            ctx,
            policy,
            next_task_num: AtomicU64::new(1),
            pending: DashMap::new(),
            remote: DashMap::new(),
            closed: DashMap::new(),
            close_seq: AtomicU64::new(0),
            closed_retention,
            workers,
            stats: ProtocolStats::default(),
        })
    }

    pub fn stats(&self) -> ProtocolStatsSnapshot {
        self.stats.snapshot()
    }

    /// Calls waiting for a result on this node.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Results this node still retains for an `AckAck`.
    pub fn retained_count(&self) -> usize {
        self.remote.len()
    }

    /// Tombstones of closed calls currently remembered.
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    // ============================================================
    // ORIGINATOR
    // ============================================================

    /// Submits `task` for execution on `target`.
    ///
    /// Contract problems (unregistered type, encoding failure, unknown target)
    /// are returned here; everything else is reported through the handle.
    pub fn submit<T: DTask>(
        self: &Arc<Self>,
        target: &NodeId,
        task: T,
    ) -> Result<TaskHandle<T>, TaskError> {
        self.ctx.registry.ensure_task::<T>()?;
        if self.ctx.directory.get_member(target).is_none() {
            return Err(TaskError::ContractViolation(format!(
                "target {:?} is not in the node directory",
                target
            )));
        }

        let state = StateCell::default();
        let (done_tx, done_rx) = oneshot::channel();

        if self.ctx.directory.is_local(target) {
            tokio::spawn(self.clone().run_local(task, state.clone(), done_tx));
            return Ok(TaskHandle::new(target.clone(), state, done_rx));
        }

        let payload = task.encode()?;
        let task_num = self.next_task_num.fetch_add(1, Ordering::Relaxed);
        let (ack_tx, ack_rx) = oneshot::channel();
        let working = Arc::new(Notify::new());
        self.pending.insert(
            task_num,
            PendingCall {
                target: target.clone(),
                ack_tx: Some(ack_tx),
                working: working.clone(),
            },
        );

        if task.log_verbose() {
            tracing::debug!(
                "Submitting {} #{} ({} bytes) to {:?}",
                T::TYPE_ID,
                task_num,
                payload.len(),
                target
            );
        }

        let envelope = Envelope {
            from: self.ctx.local_id().clone(),
            frame: Frame::Request {
                task_num,
                type_id: T::TYPE_ID.to_string(),
                payload,
            },
        };
        tokio::spawn(self.clone().drive_call(
            target.clone(),
            envelope,
            ack_rx,
            working,
            task,
            state.clone(),
            done_tx,
        ));

        Ok(TaskHandle::new(target.clone(), state, done_rx))
    }

    /// Local target: run every hook on the caller's instance, no serialization.
    async fn run_local<T: DTask>(
        self: Arc<Self>,
        task: T,
        state: StateCell,
        done_tx: oneshot::Sender<Result<T, TaskError>>,
    ) {
        state.advance(TaskState::Sent);
        let result = match self.workers.clone().acquire_owned().await {
            Ok(_permit) => {
                state.advance(TaskState::RemoteExecuting);
                let local = self.ctx.local_id().clone();
                invoke_guarded(task, self.ctx.clone(), local).await
            }
            Err(_) => {
                let _ = done_tx.send(Err(TaskError::Shutdown));
                return;
            }
        };

        let result = match result {
            Ok((mut task, Ok(()))) => {
                state.advance(TaskState::ResultSent);
                state.advance(TaskState::LocalAck);
                task.on_ack();
                state.advance(TaskState::RemoteAckAck);
                task.on_ack_ack();
                Ok(task)
            }
            Ok((mut task, Err(e))) => {
                let error = TaskError::ApplicationFailure(format!("{:#}", e));
                task.on_failure(&error);
                task.on_ack_ack();
                Err(error)
            }
            Err(panic) => Err(TaskError::ApplicationFailure(panic)),
        };

        state.advance(TaskState::Done);
        let _ = done_tx.send(result);
    }

    async fn drive_call<T: DTask>(
        self: Arc<Self>,
        target: NodeId,
        envelope: Envelope,
        mut ack_rx: oneshot::Receiver<Reply>,
        working: Arc<Notify>,
        mut task: T,
        state: StateCell,
        done_tx: oneshot::Sender<Result<T, TaskError>>,
    ) {
        let task_num = envelope.frame.task_num();
        let reply = self
            .await_ack(&target, &envelope, &mut ack_rx, &working, &state)
            .await;

        let acknowledged = reply.is_ok();
        let outcome = match reply {
            Ok(Reply::Done(bytes)) => match task.decode_into(&bytes) {
                Ok(()) => {
                    state.advance(TaskState::LocalAck);
                    task.on_ack();
                    Ok(())
                }
                Err(e) => Err(TaskError::from(e)),
            },
            Ok(Reply::Failed(failure)) => Err(TaskError::from(failure)),
            Err(e) => Err(e),
        };

        if acknowledged {
            self.send_ack_ack(&target, task_num).await;
        }
        self.pending.remove(&task_num);
        state.advance(TaskState::Done);

        let result = match outcome {
            Ok(()) => {
                if task.log_verbose() {
                    tracing::debug!("{} #{} on {:?} done", T::TYPE_ID, task_num, target);
                }
                Ok(task)
            }
            Err(e) => {
                tracing::debug!("{} #{} on {:?} failed: {}", T::TYPE_ID, task_num, target, e);
                task.on_failure(&e);
                Err(e)
            }
        };
        let _ = done_tx.send(result);
    }

    async fn await_ack(
        &self,
        target: &NodeId,
        envelope: &Envelope,
        ack_rx: &mut oneshot::Receiver<Reply>,
        working: &Notify,
        state: &StateCell,
    ) -> Result<Reply, TaskError> {
        let task_num = envelope.frame.task_num();
        let mut reliability = self.transmit(target, envelope).await;
        ProtocolStats::bump(&self.stats.requests_sent);
        state.advance(TaskState::Sent);

        let mut budget = RetryBudget::default();
        let mut delivered = false;
        loop {
            tokio::select! {
                biased;
                reply = &mut *ack_rx => {
                    return reply.map_err(|_| TaskError::Shutdown);
                }
                _ = working.notified() => {
                    if !delivered {
                        tracing::debug!(
                            "#{} is executing on {:?}, switching to wait extensions",
                            task_num,
                            target
                        );
                    }
                    delivered = true;
                    budget = RetryBudget::default();
                    continue;
                }
                _ = tokio::time::sleep(self.policy.ack_timeout) => {}
            }

            // A confirmed request needs no resend, whatever carried it.
            let leg = if delivered {
                Reliability::ReliableStream
            } else {
                reliability
            };
            match self.policy.on_overdue(leg, &mut budget) {
                RetryAction::ExtendWait => {
                    ProtocolStats::bump(&self.stats.request_wait_extensions);
                    tracing::debug!(
                        "Ack for #{} from {:?} overdue; request was delivered, waiting longer",
                        task_num,
                        target
                    );
                    self.send_poll(target, task_num).await;
                }
                RetryAction::Resend => {
                    ProtocolStats::bump(&self.stats.request_retransmits);
                    tracing::warn!(
                        "Ack for #{} from {:?} overdue, resending request (retry {})",
                        task_num,
                        target,
                        budget.retransmits
                    );
                    reliability = self.transmit(target, envelope).await;
                    ProtocolStats::bump(&self.stats.requests_sent);
                }
                RetryAction::GiveUp => {
                    self.pending.remove(&task_num);
                    tracing::warn!(
                        "Giving up on #{} to {:?} after {} attempts",
                        task_num,
                        target,
                        budget.attempts()
                    );
                    return Err(TaskError::TransportTimeout {
                        target: target.clone(),
                        attempts: budget.attempts(),
                    });
                }
            }
        }
    }

    async fn send_poll(&self, target: &NodeId, task_num: u64) {
        let envelope = Envelope {
            from: self.ctx.local_id().clone(),
            frame: Frame::Poll { task_num },
        };
        self.transmit(target, &envelope).await;
        ProtocolStats::bump(&self.stats.polls_sent);
    }

    async fn send_ack_ack(&self, target: &NodeId, task_num: u64) {
        let envelope = Envelope {
            from: self.ctx.local_id().clone(),
            frame: Frame::AckAck { task_num },
        };
        self.transmit(target, &envelope).await;
        ProtocolStats::bump(&self.stats.ackacks_sent);
    }

    /// Sends a frame, treating a transport error as a possibly lost frame.
    async fn transmit(&self, target: &NodeId, envelope: &Envelope) -> Reliability {
        match self.ctx.transport.send(target, envelope).await {
            Ok(reliability) => reliability,
            Err(e) => {
                tracing::warn!(
                    "Failed to send {:?} #{} to {:?}: {}",
                    envelope.frame.kind(),
                    envelope.frame.task_num(),
                    target,
                    e
                );
                Reliability::Unreliable
            }
        }
    }

    // ============================================================
    // INBOUND DISPATCH
    // ============================================================

    /// Entry point for every frame received by this node.
    pub fn handle_envelope(self: &Arc<Self>, envelope: Envelope) {
        let Envelope { from, frame } = envelope;
        match frame {
            Frame::Request {
                task_num,
                type_id,
                payload,
            } => self.on_request(from, task_num, type_id, payload),
            Frame::Ack { task_num, reply } => self.on_ack_frame(from, task_num, reply),
            Frame::AckAck { task_num } => self.on_ack_ack_frame(from, task_num),
            Frame::Poll { task_num } => self.on_poll_frame(from, task_num),
            Frame::Working { task_num } => self.on_working_frame(from, task_num),
        }
    }

    fn on_request(self: &Arc<Self>, from: NodeId, task_num: u64, type_id: String, payload: Vec<u8>) {
        let key = CallKey {
            origin: from,
            task_num,
        };

        if self.closed.contains_key(&key) {
            ProtocolStats::bump(&self.stats.duplicate_requests);
            tracing::trace!("Request #{} from {:?} already closed", task_num, key.origin);
            return;
        }

        match self.remote.entry(key.clone()) {
            Entry::Occupied(call) => {
                ProtocolStats::bump(&self.stats.duplicate_requests);
                let resend = match call.get() {
                    RemoteCall::Executing => None,
                    RemoteCall::Replied { ack, .. } => Some(ack.clone()),
                };
                drop(call);

                match resend {
                    None => {
                        tracing::debug!(
                            "Request #{} from {:?} still executing, reporting progress",
                            task_num,
                            key.origin
                        );
                        self.spawn_working(key);
                    }
                    Some(ack) => {
                        tracing::debug!(
                            "Request #{} from {:?} already answered, resending result",
                            task_num,
                            key.origin
                        );
                        let protocol = self.clone();
                        tokio::spawn(async move {
                            protocol.transmit(&key.origin, &ack).await;
                            ProtocolStats::bump(&protocol.stats.acks_sent);
                        });
                    }
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(RemoteCall::Executing);
                tokio::spawn(self.clone().execute_remote(key, type_id, payload));
            }
        }
    }

    fn on_poll_frame(self: &Arc<Self>, from: NodeId, task_num: u64) {
        let key = CallKey {
            origin: from,
            task_num,
        };
        let executing = self
            .remote
            .get(&key)
            .is_some_and(|call| matches!(call.value(), RemoteCall::Executing));
        if executing {
            self.spawn_working(key);
        } else {
            // Answered calls resend their own Ack; closed or unknown ones have nothing to say.
            tracing::trace!("Poll for #{} from {:?} ignored", task_num, key.origin);
        }
    }

    fn spawn_working(self: &Arc<Self>, key: CallKey) {
        let protocol = self.clone();
        tokio::spawn(async move {
            let envelope = Envelope {
                from: protocol.ctx.local_id().clone(),
                frame: Frame::Working {
                    task_num: key.task_num,
                },
            };
            protocol.transmit(&key.origin, &envelope).await;
            ProtocolStats::bump(&protocol.stats.working_sent);
        });
    }

    async fn execute_remote(self: Arc<Self>, key: CallKey, type_id: String, payload: Vec<u8>) {
        let state = StateCell::default();
        state.advance(TaskState::RemoteExecuting);

        let outcome = match self.ctx.registry.executor(&type_id) {
            Some(exec) => match self.workers.clone().acquire_owned().await {
                Ok(_permit) => exec(payload, key.origin.clone(), self.ctx.clone()).await,
                Err(_) => RemoteOutcome::failed(RemoteFailure::Application(
                    "node is shutting down".to_string(),
                )),
            },
            None => {
                tracing::error!(
                    "Request #{} from {:?} names unregistered type '{}'",
                    key.task_num,
                    key.origin,
                    type_id
                );
                RemoteOutcome::failed(RemoteFailure::Contract(format!(
                    "type '{}' is not registered on {:?}",
                    type_id,
                    self.ctx.local_id()
                )))
            }
        };
        ProtocolStats::bump(&self.stats.calls_executed);

        let ack = Envelope {
            from: self.ctx.local_id().clone(),
            frame: Frame::Ack {
                task_num: key.task_num,
                reply: outcome.reply,
            },
        };
        let (ackack_tx, ackack_rx) = oneshot::channel();
        self.remote.insert(
            key.clone(),
            RemoteCall::Replied {
                ack: ack.clone(),
                release: outcome.release,
                ackack_tx: Some(ackack_tx),
                state: state.clone(),
            },
        );

        let reliability = self.transmit(&key.origin, &ack).await;
        ProtocolStats::bump(&self.stats.acks_sent);
        state.advance(TaskState::ResultSent);

        self.await_ack_ack(key, ack, reliability, ackack_rx).await;
    }

    async fn await_ack_ack(
        &self,
        key: CallKey,
        ack: Envelope,
        mut reliability: Reliability,
        mut ackack_rx: oneshot::Receiver<()>,
    ) {
        let mut budget = RetryBudget::default();
        loop {
            match tokio::time::timeout(self.policy.ack_timeout, &mut ackack_rx).await {
                Ok(_) => return,
                Err(_) => match self.policy.on_overdue(reliability, &mut budget) {
                    RetryAction::ExtendWait => {
                        ProtocolStats::bump(&self.stats.ack_wait_extensions);
                        tracing::debug!(
                            "AckAck for #{} from {:?} overdue; result went over a stream, waiting longer",
                            key.task_num,
                            key.origin
                        );
                    }
                    RetryAction::Resend => {
                        ProtocolStats::bump(&self.stats.ack_retransmits);
                        tracing::warn!(
                            "AckAck for #{} from {:?} overdue, resending result (retry {})",
                            key.task_num,
                            key.origin,
                            budget.retransmits
                        );
                        reliability = self.transmit(&key.origin, &ack).await;
                        ProtocolStats::bump(&self.stats.acks_sent);
                    }
                    RetryAction::GiveUp => {
                        if self.remote.remove(&key).is_some() {
                            ProtocolStats::bump(&self.stats.ackack_give_ups);
                            tracing::warn!(
                                "No AckAck for #{} from {:?} after {} attempts, dropping result",
                                key.task_num,
                                key.origin,
                                budget.attempts()
                            );
                            self.close(key);
                        }
                        return;
                    }
                },
            }
        }
    }

    fn on_working_frame(&self, from: NodeId, task_num: u64) {
        match self.pending.get(&task_num) {
            Some(call) if call.target == from && call.ack_tx.is_some() => {
                ProtocolStats::bump(&self.stats.working_received);
                call.working.notify_one();
            }
            _ => tracing::trace!("Working for #{} from {:?} ignored", task_num, from),
        }
    }

    fn on_ack_frame(self: &Arc<Self>, from: NodeId, task_num: u64, reply: Reply) {
        let first = match self.pending.get_mut(&task_num) {
            Some(mut call) => {
                if call.target != from {
                    tracing::warn!(
                        "Ack for #{} came from {:?}, expected {:?}",
                        task_num,
                        from,
                        call.target
                    );
                }
                Some(call.ack_tx.take())
            }
            None => None,
        };

        match first {
            Some(Some(ack_tx)) => {
                let _ = ack_tx.send(reply);
            }
            Some(None) => {
                // Still in decode or on_ack; the AckAck follows once that is done.
                ProtocolStats::bump(&self.stats.duplicate_acks);
                tracing::debug!("Ack for #{} from {:?} already being processed", task_num, from);
            }
            None => {
                // Our AckAck was lost or this is a late resend: confirm again.
                ProtocolStats::bump(&self.stats.stale_acks);
                tracing::debug!("Stale ack for #{} from {:?}, re-sending AckAck", task_num, from);
                let protocol = self.clone();
                tokio::spawn(async move {
                    protocol.send_ack_ack(&from, task_num).await;
                });
            }
        }
    }

    fn on_ack_ack_frame(&self, from: NodeId, task_num: u64) {
        let key = CallKey {
            origin: from,
            task_num,
        };

        let removed = self
            .remote
            .remove_if(&key, |_, call| matches!(call, RemoteCall::Replied { .. }));

        match removed {
            Some((
                _,
                RemoteCall::Replied {
                    release,
                    ackack_tx,
                    state,
                    ..
                },
            )) => {
                state.advance(TaskState::RemoteAckAck);
                if let Some(release) = release {
                    release();
                }
                state.advance(TaskState::Done);
                if let Some(tx) = ackack_tx {
                    let _ = tx.send(());
                }
                tracing::trace!("Closed #{} from {:?}", task_num, key.origin);
                self.close(key);
            }
            _ => {
                ProtocolStats::bump(&self.stats.duplicate_ackacks);
                tracing::trace!("Duplicate AckAck for #{} from {:?}", task_num, key.origin);
            }
        }
    }

    /// Records a tombstone. Past the retention limit the older half is
    /// evicted, so the most recently closed calls are always remembered.
    fn close(&self, key: CallKey) {
        let seq = self.close_seq.fetch_add(1, Ordering::Relaxed) + 1;
        if self.closed.len() >= self.closed_retention.max(1) {
            let keep = (self.closed_retention / 2) as u64;
            let oldest_kept = seq.saturating_sub(keep);
            self.closed.retain(|_, closed_at| *closed_at >= oldest_kept);
            tracing::debug!("Evicted tombstones closed before #{}", oldest_kept);
        }
        self.closed.insert(key, seq);
    }
}
